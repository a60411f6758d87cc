use std::fmt::Display;

#[derive(Debug)]
pub struct RrrError {
    kind: RrrErrorKind,
    message: String,
}

impl RrrError {
    pub fn new(kind: RrrErrorKind, message: impl Into<String>) -> Self {
        return Self { kind, message: message.into() };
    }

    pub fn kind(&self) -> RrrErrorKind {
        self.kind
    }
}

impl Display for RrrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RrrError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrrErrorKind {
    Config,
    Logger,
    Instance,
    Io,
}

impl From<std::io::Error> for RrrError {
    fn from(err: std::io::Error) -> Self {
        return Self::new(RrrErrorKind::Io, err.to_string());
    }
}

impl From<toml::de::Error> for RrrError {
    fn from(err: toml::de::Error) -> Self {
        return Self::new(RrrErrorKind::Config, err.to_string());
    }
}
