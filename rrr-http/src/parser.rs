//! Top-level state machine (§4.6): first line, header fields, body
//! selection. Invoked iteratively — the caller re-submits the full buffer
//! accumulated so far; a call returns [`ParseStatus::Incomplete`] until
//! enough bytes have arrived to make progress, at which point it reports
//! `target_size` (total message length once known) and `parsed_bytes`
//! (how far the caller's cursor should advance).

use crate::chunked::ChunkedDecoder;
use crate::err::{HttpParseError, HttpParseErrorKind, ParseStatus};
use crate::header::{definition_for, parse_header_line, HeaderField};
use crate::method::Method;
use crate::multipart::DEFAULT_MAX_PARTS;
use crate::part::{FirstLine, HttpPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseType {
    Request,
    Response,
    /// A multipart sub-part: first-line parsing is skipped (§4.6).
    Multipart,
}

#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub max_multipart_parts: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        return Self { max_multipart_parts: DEFAULT_MAX_PARTS };
    }
}

#[derive(Debug)]
pub struct ParseResult {
    pub status: ParseStatus,
    /// Total message length once known (header + body); `None` while
    /// still accumulating or for a `ReadUntilClose` body whose length
    /// isn't knowable until EOF.
    pub target_size: Option<usize>,
    /// How many bytes of the input the caller's cursor should advance by.
    /// Zero while `status` is [`ParseStatus::Incomplete`].
    pub parsed_bytes: usize,
    pub part: Option<HttpPart>,
}

fn incomplete() -> ParseResult {
    ParseResult { status: ParseStatus::Incomplete, target_size: None, parsed_bytes: 0, part: None }
}

fn soft_err(code: u16) -> ParseResult {
    log::info!("http parse rejected with status {code}");
    ParseResult { status: ParseStatus::SoftErr(code), target_size: None, parsed_bytes: 0, part: None }
}

/// Parses one HTTP message (or, with `parse_type = Multipart`, one
/// multipart sub-part's headers+body) out of `buf[start..end]`.
pub fn parse(buf: &[u8], start: usize, end: usize, parse_type: ParseType, config: &ParserConfig, eof: bool) -> Result<ParseResult, HttpParseError> {
    let data = &buf[start..end];

    let Some(header_block_end) = find_double_crlf(data) else {
        return Ok(incomplete());
    };

    let header_block = &data[..header_block_end];
    let header_text = std::str::from_utf8(header_block)
        .map_err(|_| HttpParseError::new(HttpParseErrorKind::MalformedHeaderField, "header block is not valid UTF-8"))?;

    let mut lines = header_text.split("\r\n");

    let first_line = match parse_type {
        ParseType::Multipart => FirstLine::None,
        ParseType::Request => {
            let Some(line) = lines.next() else {
                return Ok(incomplete());
            };
            match parse_request_line(line) {
                Ok(fl) => fl,
                Err(ParseLineOutcome::UnsupportedVersion) => return Ok(soft_err(505)),
                Err(ParseLineOutcome::Malformed(err)) => return Err(err),
            }
        }
        ParseType::Response => {
            let Some(line) = lines.next() else {
                return Ok(incomplete());
            };
            match parse_status_line(line) {
                Ok(fl) => fl,
                Err(ParseLineOutcome::UnsupportedVersion) => return Ok(soft_err(505)),
                Err(ParseLineOutcome::Malformed(err)) => return Err(err),
            }
        }
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let name = line.split_once(':').map(|(n, _)| n.trim().to_string()).unwrap_or_default();
        headers.push(parse_header_line(line, definition_for(&name))?);
    }

    let header_total_len = header_block_end + 4; // header block + the terminating CRLFCRLF

    if let Some(method) = request_method(&first_line) {
        let has_length = find_header(&headers, "content-length").is_some();
        let has_type = find_header(&headers, "content-type").is_some();
        let has_transfer_encoding = find_header(&headers, "transfer-encoding").is_some();
        if method.forbids_body() && (has_length || has_type || has_transfer_encoding) {
            return Ok(soft_err(400));
        }
    }

    let content_length = find_header(&headers, "content-length").and_then(|h| h.value.trim().parse::<usize>().ok());
    let chunked = find_header(&headers, "transfer-encoding").map(|h| h.value.eq_ignore_ascii_case("chunked")).unwrap_or(false);

    if chunked && parse_type == ParseType::Multipart {
        return Err(HttpParseError::new(HttpParseErrorKind::ChunkedInsideMultipart, "chunked transfer-encoding is not permitted inside a multipart part"));
    }

    let body_start = header_total_len;

    if chunked {
        let mut decoder = ChunkedDecoder::new();
        let consumed = decoder.feed(&data[body_start..])?;
        if !decoder.is_done() {
            return Ok(incomplete());
        }
        let part = HttpPart { first_line, headers, body: decoder.body().to_vec() };
        let total = body_start + consumed;
        return Ok(ParseResult { status: ParseStatus::Ok, target_size: Some(total), parsed_bytes: total, part: Some(part) });
    }

    if let Some(len) = content_length {
        if data.len() - body_start < len {
            return Ok(incomplete());
        }
        let body = data[body_start..body_start + len].to_vec();
        let part = HttpPart { first_line, headers, body };
        let total = body_start + len;
        return Ok(ParseResult { status: ParseStatus::Ok, target_size: Some(total), parsed_bytes: total, part: Some(part) });
    }

    let no_body_by_default = match parse_type {
        ParseType::Request | ParseType::Multipart => true,
        ParseType::Response => matches!(status_of(&first_line), Some(204) | Some(101)),
    };

    if no_body_by_default {
        let part = HttpPart { first_line, headers, body: Vec::new() };
        return Ok(ParseResult { status: ParseStatus::Ok, target_size: Some(body_start), parsed_bytes: body_start, part: Some(part) });
    }

    // read-until-close: only reachable for responses with neither
    // Content-Length nor chunked encoding and not 204/101.
    if !eof {
        return Ok(incomplete());
    }
    let body = data[body_start..].to_vec();
    let total = data.len();
    let part = HttpPart { first_line, headers, body };
    return Ok(ParseResult { status: ParseStatus::Ok, target_size: Some(total), parsed_bytes: total, part: Some(part) });
}

fn find_header<'a>(headers: &'a [HeaderField], name: &str) -> Option<&'a HeaderField> {
    headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
}

fn request_method(first_line: &FirstLine) -> Option<&Method> {
    match first_line {
        FirstLine::Request { method, .. } => Some(method),
        _ => None,
    }
}

fn status_of(first_line: &FirstLine) -> Option<u16> {
    match first_line {
        FirstLine::Response { status, .. } => Some(*status),
        _ => None,
    }
}

enum ParseLineOutcome {
    UnsupportedVersion,
    Malformed(HttpParseError),
}

/// Only `HTTP/1.1` is accepted; any other `HTTP/x` token is an
/// unsupported version (§4.6, §6: "unrecognised protocol version
/// responds 505").
fn is_supported_version(version: &str) -> bool {
    version == "HTTP/1.1"
}

fn parse_request_line(line: &str) -> Result<FirstLine, ParseLineOutcome> {
    let mut parts = line.splitn(3, ' ');
    let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseLineOutcome::Malformed(HttpParseError::new(HttpParseErrorKind::MalformedFirstLine, format!("malformed request line '{line}'"))));
    };
    if !is_supported_version(version) {
        return Err(ParseLineOutcome::UnsupportedVersion);
    }
    return Ok(FirstLine::Request {
        method: Method::parse(method),
        uri: uri.to_string(),
        version: version.to_string(),
    });
}

fn parse_status_line(line: &str) -> Result<FirstLine, ParseLineOutcome> {
    let mut parts = line.splitn(3, ' ');
    let (Some(version), Some(status), reason) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseLineOutcome::Malformed(HttpParseError::new(HttpParseErrorKind::MalformedFirstLine, format!("malformed status line '{line}'"))));
    };
    if !is_supported_version(version) {
        return Err(ParseLineOutcome::UnsupportedVersion);
    }
    let status: u16 = status
        .parse()
        .map_err(|_| ParseLineOutcome::Malformed(HttpParseError::new(HttpParseErrorKind::MalformedFirstLine, format!("'{status}' is not a numeric status code"))))?;
    return Ok(FirstLine::Response {
        version: version.to_string(),
        status,
        reason: reason.unwrap_or("").to_string(),
    });
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ParserConfig {
        ParserConfig::default()
    }

    #[test]
    fn get_with_content_length_is_bad_request() {
        let buf = b"GET / HTTP/1.1\r\nContent-Length: 1\r\n\r\n";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::SoftErr(400));
    }

    #[test]
    fn unsupported_version_is_505() {
        let buf = b"GET / HTTP/2.0\r\n\r\n";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::SoftErr(505));
    }

    #[test]
    fn get_without_body_headers_parses_with_no_body() {
        let buf = b"GET /x HTTP/1.1\r\nHost: example\r\n\r\n";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        let part = result.part.unwrap();
        assert!(part.body.is_empty());
        assert_eq!(part.uri(), Some("/x"));
    }

    #[test]
    fn post_with_content_length_waits_for_full_body() {
        let buf = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Incomplete);

        let buf = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.part.unwrap().body, b"hello");
    }

    #[test]
    fn chunked_request_body_decodes() {
        let buf = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let result = parse(buf, 0, buf.len(), ParseType::Request, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        let part = result.part.unwrap();
        assert_eq!(part.body, b"Wikipedia");
        assert_eq!(part.body.len(), 9);
        assert_eq!(result.parsed_bytes, buf.len());
    }

    #[test]
    fn response_204_has_no_body() {
        let buf = b"HTTP/1.1 204 No Content\r\n\r\n";
        let result = parse(buf, 0, buf.len(), ParseType::Response, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        assert!(result.part.unwrap().body.is_empty());
    }

    #[test]
    fn response_without_length_reads_until_close() {
        let buf = b"HTTP/1.1 200 OK\r\n\r\nhello world";
        let result = parse(buf, 0, buf.len(), ParseType::Response, &cfg(), false).unwrap();
        assert_eq!(result.status, ParseStatus::Incomplete, "no content-length/chunked and not EOF yet");

        let result = parse(buf, 0, buf.len(), ParseType::Response, &cfg(), true).unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.part.unwrap().body, b"hello world");
    }
}
