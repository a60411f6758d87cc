//! Multipart body parsing (§4.6): requires a `boundary` subvalue on
//! `Content-Type`, recursively parses up to a configurable number of
//! parts, and rejects `Transfer-Encoding: chunked` inside a part.

use crate::err::{HttpParseError, HttpParseErrorKind};
use crate::header::{definition_for, parse_header_line, HeaderField};
use crate::query::Field;

/// `max_parts = 1000` in the original is an unexplained literal (§9 Open
/// Questions); exposed here as a configurable default rather than baked
/// into the parser.
pub const DEFAULT_MAX_PARTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub headers: Vec<HeaderField>,
    pub body: Vec<u8>,
}

impl MultipartPart {
    pub fn header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// `content-disposition.name` → field name, raw body bytes → field
    /// value (§4.6 "multipart extractor walks sub-parts").
    pub fn as_field(&self) -> Option<Field> {
        let disposition = self.header("content-disposition")?;
        let name = disposition.subvalue("name")?.to_string();
        let value = String::from_utf8_lossy(&self.body).into_owned();
        return Some(Field { name, value: Some(value) });
    }
}

/// Parses a full multipart body given `boundary` (without the leading
/// `--`), rejecting more than `max_parts` and any part that declares
/// `Transfer-Encoding: chunked` (§4.6: "rejects chunked-inside-multipart").
pub fn parse_multipart_body(body: &[u8], boundary: &str, max_parts: usize) -> Result<Vec<MultipartPart>, HttpParseError> {
    let delimiter = format!("--{boundary}");
    let text_boundary = delimiter.as_bytes();

    let segments = split_on_boundary(body, text_boundary);
    let mut parts = Vec::new();

    for segment in segments {
        let segment = trim_leading_crlf(segment);
        if segment.is_empty() || segment == b"--" {
            continue;
        }
        if parts.len() >= max_parts {
            return Err(HttpParseError::new(HttpParseErrorKind::TooManyParts, format!("multipart body exceeds {max_parts} parts")));
        }
        parts.push(parse_one_part(segment)?);
    }

    return Ok(parts);
}

fn parse_one_part(segment: &[u8]) -> Result<MultipartPart, HttpParseError> {
    let Some(header_end) = find_double_crlf(segment) else {
        return Err(HttpParseError::new(HttpParseErrorKind::MalformedHeaderField, "multipart part has no header/body separator"));
    };

    let header_bytes = &segment[..header_end];
    // the CRLF immediately before the next "--boundary" delimiter belongs
    // to the delimiter line, not the part's content.
    let mut body = &segment[header_end + 4..];
    body = body.strip_suffix(b"\r\n").unwrap_or(body);
    let body = body.to_vec();

    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|_| HttpParseError::new(HttpParseErrorKind::MalformedHeaderField, "multipart part headers are not UTF-8"))?;

    let mut headers = Vec::new();
    for line in header_text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let name = line.split_once(':').map(|(n, _)| n.trim().to_string()).unwrap_or_default();
        let field = parse_header_line(line, definition_for(&name))?;
        if field.name.eq_ignore_ascii_case("transfer-encoding") && field.value.eq_ignore_ascii_case("chunked") {
            return Err(HttpParseError::new(HttpParseErrorKind::ChunkedInsideMultipart, "chunked transfer-encoding is not permitted inside a multipart part"));
        }
        headers.push(field);
    }

    return Ok(MultipartPart { headers, body });
}

fn split_on_boundary<'a>(body: &'a [u8], boundary: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = body;
    while let Some(pos) = find_subslice(rest, boundary) {
        if pos > 0 {
            // bytes before the first boundary are preamble, discarded.
        }
        rest = &rest[pos + boundary.len()..];
        if let Some(next) = find_subslice(rest, boundary) {
            segments.push(&rest[..next]);
            rest = &rest[next..];
        } else {
            break;
        }
    }
    return segments;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn trim_leading_crlf(buf: &[u8]) -> &[u8] {
    buf.strip_prefix(b"\r\n").unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_field_multipart_form() {
        let body = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "\r\n",
            "1\r\n",
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"b\"\r\n",
            "\r\n",
            "two\r\n",
            "--boundary--\r\n",
        );

        let parts = parse_multipart_body(body.as_bytes(), "boundary", DEFAULT_MAX_PARTS).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_field(), Some(Field { name: "a".into(), value: Some("1".into()) }));
        assert_eq!(parts[1].as_field(), Some(Field { name: "b".into(), value: Some("two".into()) }));
    }

    #[test]
    fn rejects_chunked_transfer_encoding_inside_a_part() {
        let body = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n",
            "1\r\n",
            "--boundary--\r\n",
        );
        let err = parse_multipart_body(body.as_bytes(), "boundary", DEFAULT_MAX_PARTS).unwrap_err();
        assert_eq!(err.kind(), HttpParseErrorKind::ChunkedInsideMultipart);
    }

    #[test]
    fn rejects_more_than_max_parts() {
        let mut body = String::new();
        for i in 0..3 {
            body.push_str(&format!("--b\r\nContent-Disposition: form-data; name=\"f{i}\"\r\n\r\nx\r\n"));
        }
        body.push_str("--b--\r\n");
        let err = parse_multipart_body(body.as_bytes(), "b", 2).unwrap_err();
        assert_eq!(err.kind(), HttpParseErrorKind::TooManyParts);
    }
}
