//! The parsed representation a [`crate::parser::parse`] call produces:
//! first line (absent for multipart sub-parts), header fields, and body.

use crate::header::HeaderField;
use crate::method::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstLine {
    Request { method: Method, uri: String, version: String },
    Response { version: String, status: u16, reason: String },
    /// Multipart sub-parts re-enter the parser with first-line parsing
    /// skipped (§4.6).
    None,
}

#[derive(Debug, Clone)]
pub struct HttpPart {
    pub first_line: FirstLine,
    pub headers: Vec<HeaderField>,
    pub body: Vec<u8>,
}

impl HttpPart {
    pub fn header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.value.trim().parse().ok()
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|h| h.value.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type").map(|h| h.value.as_str())
    }

    pub fn status(&self) -> Option<u16> {
        match &self.first_line {
            FirstLine::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.first_line {
            FirstLine::Request { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.first_line {
            FirstLine::Request { uri, .. } => Some(uri),
            _ => None,
        }
    }
}
