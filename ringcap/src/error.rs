// ringcap/src/error.rs
//! Error kinds for the capture core.

use std::fmt;

/// The five error kinds the capture core can surface, each carrying a
/// short context string identifying the interface and/or failing
/// operation, so diagnostics name the interface and the syscall that
/// failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad argument, `threads > rings`, filter compile failure, or
    /// RX ring count != TX ring count.
    Config(String),
    /// Interface was administratively down at open time.
    IfaceDown(String),
    /// Allocation, `mmap`, `open`, or ring-register failure.
    Resource(String),
    /// `poll`/read error encountered after initialization.
    Io(String),
    /// Transient downstream or allocation failure during a drain
    /// iteration; the next poll cycle retries.
    DrainFailure(String),
}

impl Error {
    /// Short, stable tag for the error kind (used in log lines and tests).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::IfaceDown(_) => "IFACE_DOWN",
            Error::Resource(_) => "RESOURCE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::DrainFailure(_) => "DRAIN_FAILURE",
        }
    }

    fn context(&self) -> &str {
        match self {
            Error::Config(c)
            | Error::IfaceDown(c)
            | Error::Resource(c)
            | Error::Io(c)
            | Error::DrainFailure(c) => c,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.context())
    }
}

impl std::error::Error for Error {}

/// Convenience `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
