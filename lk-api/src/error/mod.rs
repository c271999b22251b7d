//! Error handling for the kernel core

use ::core::fmt;

use alloc::string::{String, ToString};

use crate::core::types::Pid;

/// Common error type used throughout the kernel core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The PID pool is exhausted
    OutOfPids,
    /// No room for another descriptor or allocation failed
    OutOfMemory,
    /// No live process with this PID
    NoSuchProcess(Pid),
    /// Invalid argument
    InvalidArgument(String),
    /// Operation not allowed in the current state
    InvalidState(String),
    /// Resource not found
    NotFound(String),
    /// Resource already exists
    AlreadyExists(String),
    /// Permission denied
    PermissionDenied(String),
    /// Handle is not open
    BadHandle(u32),
    /// Handle table is full
    TooManyOpenFiles,
    /// Path exceeds the accepted length
    PathTooLong { len: usize, max: usize },
    /// Path is malformed
    InvalidPath(String),
    /// User address is not mapped
    BadAddress(u32),
    /// Executable could not be loaded
    LoadFailed(String),
    /// I/O error
    IoError(String),
    /// Configuration error
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfPids => write!(f, "Out of process identifiers"),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::NoSuchProcess(pid) => write!(f, "No such process: {}", pid),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            Error::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Error::BadHandle(h) => write!(f, "Bad handle: {}", h),
            Error::TooManyOpenFiles => write!(f, "Too many open files"),
            Error::PathTooLong { len, max } => {
                write!(f, "Path too long: {} characters (max {})", len, max)
            }
            Error::InvalidPath(path) => write!(f, "Invalid path: {}", path),
            Error::BadAddress(addr) => write!(f, "Bad user address: {:#010x}", addr),
            Error::LoadFailed(msg) => write!(f, "Load failed: {}", msg),
            Error::IoError(msg) => write!(f, "I/O error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = ::core::result::Result<T, Error>;

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &str) -> Error {
    Error::InvalidArgument(msg.to_string())
}

/// Creates a new invalid state error
pub fn invalid_state(msg: &str) -> Error {
    Error::InvalidState(msg.to_string())
}

/// Creates a new not found error
pub fn not_found(what: &str) -> Error {
    Error::NotFound(what.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::PathTooLong { len: 300, max: 260 }.to_string(),
            "Path too long: 300 characters (max 260)"
        );
        assert_eq!(Error::BadAddress(0x1000).to_string(), "Bad user address: 0x00001000");
        assert_eq!(invalid_state("registry sealed").to_string(), "Invalid state: registry sealed");
    }

    #[test]
    fn test_constructors_pick_the_variant() {
        assert_eq!(invalid_argument("bad drive"), Error::InvalidArgument("bad drive".into()));
        assert_eq!(not_found("/A/GAME.EXE"), Error::NotFound("/A/GAME.EXE".into()));
    }
}
