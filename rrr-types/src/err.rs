use core::fmt::{self, Display};

#[derive(Debug, Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> DecodeErrorKind {
        return self.kind;
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Unknown kind tag, zero element count, or an integer/blob length that
    /// cannot describe the received bytes.
    Malformed,
    /// Decoded total exceeded a caller-configured maximum.
    TooBig,
    Utf8ParseError,
    ChecksumMismatch,
    MalformedTopic,
    DefinitionSyntax,
}

#[derive(Debug, Clone)]
pub struct EncodeError {
    kind: EncodeErrorKind,
    message: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> EncodeErrorKind {
        return self.kind;
    }
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EncodeError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeErrorKind {
    OversizedPayload,
    OversizedTopic,
}
