use std::fmt::Display;

/// Outcome of one parse call (§4.6, §7): the parser is invoked iteratively,
/// so "not enough bytes yet" is a distinct, non-error outcome from a
/// malformed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    /// The caller should accumulate more bytes and call again.
    Incomplete,
    /// Peer-caused error; the response status the caller should send back
    /// (`400` bad request, `505` unsupported version, ...).
    SoftErr(u16),
    /// Local invariant broken; tear down the connection/subsystem.
    HardErr,
}

#[derive(Debug, Clone)]
pub struct HttpParseError {
    kind: HttpParseErrorKind,
    message: String,
}

impl HttpParseError {
    pub fn new(kind: HttpParseErrorKind, message: impl Into<String>) -> Self {
        return Self { kind, message: message.into() };
    }

    pub fn kind(&self) -> HttpParseErrorKind {
        self.kind
    }
}

impl Display for HttpParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HttpParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpParseErrorKind {
    MalformedFirstLine,
    UnsupportedVersion,
    MalformedHeaderField,
    MultipleNotAllowed,
    PairsNotAllowed,
    MissingBoundary,
    ChunkedInsideMultipart,
    TooManyParts,
    MalformedChunkSize,
    BadRequest,
}
