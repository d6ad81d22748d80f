//! Pipeline Error Types
//!
//! Processing itself never fails: every per-archive problem becomes an
//! [`Outcome`](crate::Outcome). Only setting a pipeline up can.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The ledger could not be loaded.
    #[display("processing journal unavailable")]
    Journal,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Journal => true,
        }
    }
}
