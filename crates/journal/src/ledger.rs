use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tsm_storage::ContentDigest;

/// Set of content digests that have already been processed, backed by an
/// append-only text file with one lowercase hex digest per line.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    digests: Mutex<HashSet<ContentDigest>>,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger; the file
    /// is created by the first [`insert`](Self::insert).
    ///
    /// Lines that are not digests are skipped with a warning, never fatal.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Ledger(path.clone())),
        };
        let mut digests = HashSet::new();
        for (number, line) in String::from_utf8_lossy(&contents).lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<ContentDigest>() {
                Ok(digest) => {
                    digests.insert(digest);
                },
                Err(_) => tracing::warn!(path = %path.display(), line = number + 1, "Skipping malformed ledger entry"),
            }
        }
        tracing::debug!(path = %path.display(), entries = digests.len(), "Ledger loaded");
        Ok(Self { path, digests: Mutex::new(digests) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.digests.lock().unwrap_or_else(PoisonError::into_inner).contains(digest)
    }

    /// Record `digest`, appending it to the file only if it is new.
    ///
    /// Returns whether the digest was added. The in-memory set only changes
    /// once the line has been written.
    pub fn insert(&self, digest: &ContentDigest) -> Result<bool> {
        let mut digests = self.digests.lock().unwrap_or_else(PoisonError::into_inner);
        if digests.contains(digest) {
            return Ok(false);
        }
        self.append(digest).or_raise(|| ErrorKind::Ledger(self.path.clone()))?;
        digests.insert(digest.clone());
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.digests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, digest: &ContentDigest) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{digest}")?;
        file.sync_data()
    }
}
