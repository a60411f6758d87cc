//! Request methods and the body-forbidden validation rule of §4.6.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Options,
    Delete,
    Post,
    Put,
    Connect,
    Trace,
    Patch,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "DELETE" => Self::Delete,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            "PATCH" => Self::Patch,
            other => Self::Other(other.to_string()),
        }
    }

    /// GET/HEAD/OPTIONS/DELETE must not carry a body (§4.6 method
    /// validation): a non-zero `Content-Length`, any `Content-Type`, or
    /// any `Transfer-Encoding` on one of these is `400 BAD_REQUEST`.
    pub fn forbids_body(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Delete)
    }
}

/// How a POST (or any body-bearing request) should have its body
/// interpreted, dispatched by `Content-Type` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBodyContentKind {
    Multipart,
    UrlEncoded,
    TextPlain,
    OctetStream,
}

impl RequestBodyContentKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::OctetStream;
        };
        let primary = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match primary.as_str() {
            "multipart/form-data" => Self::Multipart,
            "application/x-www-form-urlencoded" => Self::UrlEncoded,
            "text/plain" => Self::TextPlain,
            _ => Self::OctetStream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_head_options_delete_forbid_a_body() {
        assert!(Method::Get.forbids_body());
        assert!(Method::Head.forbids_body());
        assert!(Method::Options.forbids_body());
        assert!(Method::Delete.forbids_body());
        assert!(!Method::Post.forbids_body());
        assert!(!Method::Put.forbids_body());
    }

    #[test]
    fn content_kind_dispatches_on_primary_type() {
        assert_eq!(RequestBodyContentKind::from_content_type(Some("multipart/form-data; boundary=xyz")), RequestBodyContentKind::Multipart);
        assert_eq!(RequestBodyContentKind::from_content_type(Some("application/x-www-form-urlencoded")), RequestBodyContentKind::UrlEncoded);
        assert_eq!(RequestBodyContentKind::from_content_type(Some("text/plain")), RequestBodyContentKind::TextPlain);
        assert_eq!(RequestBodyContentKind::from_content_type(Some("application/octet-stream")), RequestBodyContentKind::OctetStream);
        assert_eq!(RequestBodyContentKind::from_content_type(None), RequestBodyContentKind::OctetStream);
    }
}
