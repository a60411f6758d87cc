use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchErrorKind {
    /// A function or periodic callback asked the loop to stop cleanly.
    Exit,
    /// A function or periodic callback reported an application error.
    Callback,
    /// The underlying reactor failed.
    Io,
    /// `code` was greater than `FUNCTION_MAX` or had no callback registered.
    UnknownFunction,
}

#[derive(Debug)]
pub struct DispatchError {
    kind: DispatchErrorKind,
    message: String,
}

impl DispatchError {
    pub fn new(kind: DispatchErrorKind, message: impl Into<String>) -> Self {
        return Self {
            kind,
            message: message.into(),
        };
    }

    pub fn kind(&self) -> DispatchErrorKind {
        self.kind
    }

    pub fn is_exit(&self) -> bool {
        self.kind == DispatchErrorKind::Exit
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DispatchError {}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::new(DispatchErrorKind::Io, err.to_string())
    }
}
