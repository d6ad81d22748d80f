//! Local directory listing.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use std::fs::Metadata;
use std::path::Path;
use tokio::fs;

/// List the regular files directly inside `dir` whose extension matches
/// `extension` (case-insensitive, without the leading dot).
///
/// The listing is flat: subdirectories are not descended into. Symlinks are
/// followed, and entries that vanish or can't be stat'ed between `read_dir`
/// and `metadata` are skipped (they will be picked up by the next listing if
/// they come back). Results are sorted by path.
///
/// # Errors
///
/// Fails when `dir` itself can't be read.
pub async fn list_files(dir: &Path, extension: &str) -> Result<Vec<FileInfo>> {
    let suffix = format!(".{}", extension.to_lowercase());
    let mut entries = fs::read_dir(dir).await.map_err(|e| ErrorKind::io(e, dir))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| ErrorKind::io(e, dir))? {
        let path = entry.path();
        if !entry.file_name().to_string_lossy().to_lowercase().ends_with(&suffix) {
            continue;
        }
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping entry that could not be inspected");
                continue;
            },
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(info(path, &metadata));
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn info(path: impl Into<std::path::PathBuf>, metadata: &Metadata) -> FileInfo {
    let modified = metadata.modified().map(Into::into).unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    FileInfo::new(path, metadata.len(), modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_matching_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.zip"), b"bb").unwrap();
        std::fs::write(dir.path().join("A.ZIP"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        std::fs::create_dir(dir.path().join("folder.zip")).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.zip"), b"c").unwrap();

        let files = list_files(dir.path(), "zip").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["A.ZIP", "b.zip"]);
        assert_eq!(files[1].size, 2);
        assert_eq!(files[1].path, dir.path().join("b.zip"));
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(dir.path(), "zip").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = list_files(&missing, "zip").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if *p == missing));
    }
}
