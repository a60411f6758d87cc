use std::fmt::Display;

#[derive(Debug)]
pub struct ShmError {
    kind: ShmErrorKind,
    message: String,
}

impl ShmError {
    pub fn new(kind: ShmErrorKind, message: impl Into<String>) -> Self {
        return Self { kind, message: message.into() };
    }

    pub fn from_errno(kind: ShmErrorKind, context: &str) -> Self {
        let errno = std::io::Error::last_os_error();
        return Self::new(kind, format!("{context}: {errno}"));
    }

    pub fn kind(&self) -> ShmErrorKind {
        self.kind
    }
}

impl Display for ShmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ShmError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmErrorKind {
    MasterMapFailed,
    MutexInitFailed,
    ShmOpenFailed,
    TruncateFailed,
    MmapFailed,
    /// The master's slot table has no free entry (§4.7
    /// `RRR_SHM_COLLECTION_MAX`).
    CollectionFull,
    /// `handle` does not refer to a slot the master currently considers
    /// allocated.
    InvalidHandle,
    /// `free` was called on a handle that wasn't allocated.
    DoubleFree,
}
