//! Relative path validation.
//!
//! Archive entry names come from untrusted input; before an entry is written
//! to disk its name must resolve to a location *inside* the directory it is
//! being extracted into.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a relative path (typically an archive entry name).
///
/// `.` components, duplicate and leading separators are dropped, and `..`
/// is resolved lexically. The path is rejected when resolution would climb
/// above the root, when it carries a platform prefix (`C:`), when it
/// contains a NUL byte, or when nothing is left after normalization.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tsm_storage::validate_path;
/// assert_eq!(validate_path("scripts/main.lua").unwrap(), Path::new("scripts/main.lua"));
/// assert_eq!(validate_path("scripts/../main.lua").unwrap(), Path::new("main.lua"));
/// assert!(validate_path("../main.lua").is_err());
/// assert!(validate_path("a\0b").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate the path in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("main.lua", "main.lua")]
    #[case("data/meta.manifest", "data/meta.manifest")]
    #[case("data//nested/./file.txt", "data/nested/file.txt")]
    #[case("dir/", "dir")]
    #[case("/rooted/main.lua", "rooted/main.lua")]
    #[case("a/b/../../c.lua", "c.lua")]
    fn accepts_entries_inside_root(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../evil.lua")]
    #[case("a/../../evil.lua")]
    #[case("..")]
    #[case("")]
    #[case(".")]
    #[case("a\0b.lua")]
    fn rejects_entries_escaping_root(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
