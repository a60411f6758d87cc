use std::fmt::Display;

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
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EncodeError {}

#[derive(Clone, Debug, Copy, PartialEq)]
pub enum EncodeErrorKind {
    OversizedPayload,
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DecodeError {}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> DecodeErrorKind {
        return self.kind;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodeErrorKind {
    FlagBits,
    PacketType,
    QoS,
    Utf8ParseError,
    MalformedLength,
    MalformedTopicFilter,
    MalformedTopicName,
    InvalidProtocol,
    /// A property identifier was repeated where the spec forbids it, or an
    /// integer property fell outside its allowed range.
    ProtocolError,
    /// A property set, packet, or identifier table was structurally
    /// unparsable.
    MalformedPacket,
}

/// Protocol-level outcome surfaced by the session storage engine back to
/// the connection collection (§4.4 session storage engine interface).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Ok,
    Deleted,
    SessionError,
    InternalError,
}
