//! Header field lines: `name: value[; subname=subvalue[, subname=subvalue]]`
//! (§4.6), with per-header-name definitions constraining whether the
//! subvalue list may hold more than one entry (`ALLOW_MULTIPLE`) and
//! whether subvalues may carry a `name=value` pair at all (`NO_PAIRS`).

use crate::err::{HttpParseError, HttpParseErrorKind};

/// One `subname` or `subname=subvalue` entry following the header's main
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSubvalue {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
    pub subvalues: Vec<HeaderSubvalue>,
}

impl HeaderField {
    pub fn subvalue(&self, name: &str) -> Option<&str> {
        self.subvalues
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .and_then(|s| s.value.as_deref())
    }

    pub fn has_subvalue(&self, name: &str) -> bool {
        self.subvalues.iter().any(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderDefinition {
    pub allow_multiple: bool,
    pub no_pairs: bool,
}

const DEFAULT_DEFINITION: HeaderDefinition = HeaderDefinition {
    allow_multiple: false,
    no_pairs: false,
};

/// Definitions for the header names this parser gives special subvalue
/// treatment; any other header name gets [`DEFAULT_DEFINITION`] (single
/// subvalue group, pairs allowed), matching §4.6's "only allowed for
/// header definitions marked ALLOW_MULTIPLE"/"NO_PAIRS" language without
/// inventing a larger table than the spec names.
pub fn definition_for(name: &str) -> HeaderDefinition {
    match name.to_ascii_lowercase().as_str() {
        "content-disposition" => HeaderDefinition { allow_multiple: true, no_pairs: false },
        "transfer-encoding" | "connection" | "accept" | "accept-encoding" | "accept-language" | "te" => {
            HeaderDefinition { allow_multiple: true, no_pairs: true }
        }
        _ => DEFAULT_DEFINITION,
    }
}

/// Parses one unfolded header line's bytes (CRLF already stripped) into a
/// [`HeaderField`], applying `definition`'s constraints.
pub fn parse_header_line(line: &str, definition: HeaderDefinition) -> Result<HeaderField, HttpParseError> {
    let (name, rest) = line.split_once(':').ok_or_else(|| {
        HttpParseError::new(HttpParseErrorKind::MalformedHeaderField, format!("header line '{line}' has no ':' separator"))
    })?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(HttpParseError::new(HttpParseErrorKind::MalformedHeaderField, "empty header name"));
    }

    let mut segments = rest.splitn(2, ';');
    let value = segments.next().unwrap_or("").trim().to_string();
    let tail = segments.next();

    let mut subvalues = Vec::new();
    if let Some(tail) = tail {
        for group in tail.split(',') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            subvalues.push(parse_subvalue(group, definition)?);
        }
        if !definition.allow_multiple && subvalues.len() > 1 {
            return Err(HttpParseError::new(
                HttpParseErrorKind::MultipleNotAllowed,
                format!("header '{name}' does not allow more than one subvalue"),
            ));
        }
    }

    return Ok(HeaderField { name, value, subvalues });
}

fn parse_subvalue(group: &str, definition: HeaderDefinition) -> Result<HeaderSubvalue, HttpParseError> {
    match group.split_once('=') {
        Some((subname, subvalue)) => {
            if definition.no_pairs {
                return Err(HttpParseError::new(
                    HttpParseErrorKind::PairsNotAllowed,
                    format!("'{group}' carries a name=value pair but this header forbids pairs"),
                ));
            }
            let subvalue = subvalue.trim().trim_matches('"').to_string();
            Ok(HeaderSubvalue { name: subname.trim().to_string(), value: Some(subvalue) })
        }
        None => Ok(HeaderSubvalue { name: group.trim().to_string(), value: None }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_type_boundary() {
        let field = parse_header_line("Content-Type: multipart/form-data; boundary=abc123", DEFAULT_DEFINITION).unwrap();
        assert_eq!(field.value, "multipart/form-data");
        assert_eq!(field.subvalue("boundary"), Some("abc123"));
    }

    #[test]
    fn rejects_multiple_subvalues_unless_allowed() {
        let err = parse_header_line("Content-Type: text/plain; a=1, b=2", DEFAULT_DEFINITION).unwrap_err();
        assert_eq!(err.kind(), HttpParseErrorKind::MultipleNotAllowed);

        let ok = parse_header_line("Content-Disposition: form-data; name=\"f\", filename=\"g\"", definition_for("content-disposition")).unwrap();
        assert_eq!(ok.subvalue("name"), Some("f"));
        assert_eq!(ok.subvalue("filename"), Some("g"));
    }

    #[test]
    fn rejects_pairs_on_no_pairs_headers() {
        let err = parse_header_line("Transfer-Encoding: chunked=1", definition_for("transfer-encoding")).unwrap_err();
        assert_eq!(err.kind(), HttpParseErrorKind::PairsNotAllowed);

        let ok = parse_header_line("Transfer-Encoding: chunked", definition_for("transfer-encoding")).unwrap();
        assert_eq!(ok.value, "chunked");
    }
}
