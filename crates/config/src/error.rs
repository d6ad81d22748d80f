//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::DirectoryKind;
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A config error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Fix the configuration sources (file syntax, environment values).
    #[display("invalid configuration: {_0}")]
    Load(figment::Error),
    /// An explicitly named configuration file doesn't exist.
    #[display("configuration file not found: {}", _0.display())]
    ConfigFile(#[error(not(source))] PathBuf),
    /// Configure the directory (or remember one) before starting.
    #[display("{_0} directory is not configured or does not exist")]
    DirectoryMissing(#[error(not(source))] DirectoryKind),
    #[display("I/O error on {}: {_1}", _0.display())]
    Io(PathBuf, #[error(source)] IoError),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(..))
    }
}
