//! Query-string / `application/x-www-form-urlencoded` extractor (§4.6):
//! `%HH` percent-decoding and `+` → space, emitting name/value (or
//! name-only) pairs.

/// One decoded `name=value` (or bare `name`) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Option<String>,
}

/// Decodes a single percent-encoded/`+`-escaped component.
pub fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    return String::from_utf8_lossy(&out).into_owned();
}

/// Splits `query` (the part after `?` in a URI, or an
/// `application/x-www-form-urlencoded` body) on `&`, each entry on the
/// first `=`, and decodes both sides.
pub fn extract_fields(query: &str) -> Vec<Field> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => Field { name: decode_component(name), value: Some(decode_component(value)) },
            None => Field { name: decode_component(entry), value: None },
        })
        .collect()
}

/// Splits a request-target into `(path, query)`, where `query` is `""`
/// when no `?` is present.
pub fn split_uri(uri: &str) -> (&str, &str) {
    match uri.split_once('?') {
        Some((path, query)) => (path, query),
        None => (uri, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_and_plus() {
        assert_eq!(decode_component("a+b%20c"), "a b c");
        assert_eq!(decode_component("100%25"), "100%");
    }

    #[test]
    fn extracts_name_value_and_name_only_fields() {
        let fields = extract_fields("a=1&b=two+words&flag");
        assert_eq!(
            fields,
            vec![
                Field { name: "a".into(), value: Some("1".into()) },
                Field { name: "b".into(), value: Some("two words".into()) },
                Field { name: "flag".into(), value: None },
            ]
        );
    }

    #[test]
    fn splits_uri_on_question_mark() {
        assert_eq!(split_uri("/path?a=1"), ("/path", "a=1"));
        assert_eq!(split_uri("/path"), ("/path", ""));
    }
}
