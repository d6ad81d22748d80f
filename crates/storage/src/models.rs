//! Storage models.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path of the file (the listed directory joined with the file name)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// The (path, size, modification time) triplet identifying this exact
    /// state of the file. Any write that changes size or mtime produces a
    /// different fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            path: self.path.clone(),
            size: self.size,
            modified: self.modified.unix_timestamp_nanos(),
        }
    }
}

/// Cheap identity of a file's state, used to avoid re-hashing files that have
/// not changed since they were last looked at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub path: PathBuf,
    pub size: u64,
    /// Nanoseconds since the Unix epoch
    pub modified: i128,
}
