//! Content-aware file copies.

use crate::digest::hash_file;
use crate::error::{ErrorKind, Result};
use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use tracing::instrument;

/// What [`sync_file`] had to do to make the destination match the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// The destination was missing or differed, and now holds the source bytes.
    Copied,
    /// The destination already held identical bytes; nothing was written.
    Identical,
}

/// Ensure `destination` contains exactly the bytes of `source`.
///
/// When the destination exists, both files are digested and compared; equal
/// digests mean nothing is written. Otherwise the source is staged into a
/// temporary file *inside the destination directory* (so the final rename
/// never crosses filesystems), its permissions and modification time are
/// copied over, and the staged file is renamed onto the destination. Parent
/// directories are created as needed.
///
/// Readers of `destination` therefore see either the old bytes or the new
/// ones, never a partial copy.
///
/// # Errors
///
/// Any I/O failure while digesting, staging or renaming. The destination is
/// left untouched in that case.
#[instrument(level = "debug", skip_all, fields(source = %source.display(), destination = %destination.display()))]
pub fn sync_file(source: &Path, destination: &Path) -> Result<SyncStatus> {
    let metadata = fs::metadata(source).map_err(|e| ErrorKind::io(e, source))?;
    match fs::metadata(destination) {
        Ok(_) => {
            if hash_file(source)? == hash_file(destination)? {
                return Ok(SyncStatus::Identical);
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => exn::bail!(ErrorKind::io(e, destination)),
    }
    replace(source, destination, &metadata)?;
    Ok(SyncStatus::Copied)
}

fn replace(source: &Path, destination: &Path, metadata: &Metadata) -> Result<()> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| ErrorKind::io(e, parent))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".tsm-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| ErrorKind::io(e, parent))?;
    let mut input = File::open(source).map_err(|e| ErrorKind::io(e, source))?;
    io::copy(&mut input, staged.as_file_mut()).map_err(|e| ErrorKind::io(e, destination))?;

    let output = staged.as_file();
    output.set_permissions(metadata.permissions()).map_err(|e| ErrorKind::io(e, destination))?;
    if let Ok(modified) = metadata.modified() {
        output.set_modified(modified).map_err(|e| ErrorKind::io(e, destination))?;
    }
    output.sync_all().map_err(|e| ErrorKind::io(e, destination))?;
    // On failure the staged file is handed back inside the error and removed
    // when it drops.
    staged.persist(destination).map_err(|e| ErrorKind::io(e.error, destination))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn staged_leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
            .count()
    }

    #[test]
    fn copies_into_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("game123.zip");
        fs::write(&source, b"cleaned archive").unwrap();
        let destination = dir.path().join("primary/nested/game123.zip");

        assert_eq!(sync_file(&source, &destination).unwrap(), SyncStatus::Copied);
        assert_eq!(fs::read(&destination).unwrap(), b"cleaned archive");
        assert_eq!(staged_leftovers(destination.parent().unwrap()), 0);
    }

    #[test]
    fn identical_destination_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.zip");
        let destination = dir.path().join("b.zip");
        fs::write(&source, b"same").unwrap();
        fs::write(&destination, b"same").unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        File::options().write(true).open(&destination).unwrap().set_modified(old).unwrap();

        assert_eq!(sync_file(&source, &destination).unwrap(), SyncStatus::Identical);
        assert_eq!(fs::metadata(&destination).unwrap().modified().unwrap(), old);
    }

    #[test]
    fn differing_destination_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.zip");
        let destination = dir.path().join("b.zip");
        fs::write(&source, b"new contents").unwrap();
        fs::write(&destination, b"old").unwrap();

        assert_eq!(sync_file(&source, &destination).unwrap(), SyncStatus::Copied);
        assert_eq!(fs::read(&destination).unwrap(), b"new contents");
        assert_eq!(sync_file(&source, &destination).unwrap(), SyncStatus::Identical);
        assert_eq!(staged_leftovers(dir.path()), 0);
    }

    #[test]
    fn modification_time_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.zip");
        fs::write(&source, b"data").unwrap();
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options().write(true).open(&source).unwrap().set_modified(stamp).unwrap();
        let destination = dir.path().join("out/a.zip");

        sync_file(&source, &destination).unwrap();
        assert_eq!(fs::metadata(&destination).unwrap().modified().unwrap(), stamp);
    }

    #[test]
    fn missing_source_fails_without_touching_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("b.zip");
        fs::write(&destination, b"keep me").unwrap();

        let err = sync_file(&dir.path().join("missing.zip"), &destination).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert_eq!(fs::read(&destination).unwrap(), b"keep me");
    }
}
