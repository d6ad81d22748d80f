//! Package Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;
use zip::result::ZipError;

/// A package error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading the input, or writing the workspace, failed.
    #[display("I/O error on {}: {_1}", _0.display())]
    Io(PathBuf, #[error(source)] IoError),
    /// The archive is corrupt, truncated or not a zip at all. Don't retry
    /// with the same input.
    #[display("unreadable archive: {_0}")]
    Archive(ZipError),
    /// An entry name would be extracted outside of the workspace.
    #[display("unsafe entry path in archive: {_0:?}")]
    UnsafeEntry(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::UnsafeEntry("../evil.lua".to_string()).to_string(),
            "unsafe entry path in archive: \"../evil.lua\""
        );
        let archive = ErrorKind::Archive(ZipError::InvalidArchive("bad".into())).to_string();
        assert!(archive.starts_with("unreadable archive: "));
    }

    #[test]
    fn error_kind_retryable() {
        let io = IoError::from(std::io::ErrorKind::Other);
        assert!(ErrorKind::Io(PathBuf::from("x"), io).is_retryable());
        assert!(!ErrorKind::UnsafeEntry(String::new()).is_retryable());
    }
}
