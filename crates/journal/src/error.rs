//! Journal Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A journal error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for journal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Both variants mean a record could not be made durable. The underlying
/// cause is attached as a child in the error tree.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("ledger unavailable: {}", _0.display())]
    Ledger(#[error(not(source))] PathBuf),
    #[display("audit log unavailable: {}", _0.display())]
    Audit(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
