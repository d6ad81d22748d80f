//! Content digests.
//!
//! Files are identified by the MD5 digest of their bytes, rendered as 32
//! lowercase hexadecimal characters. MD5 keeps digests interchangeable with
//! existing `processed_md5.txt` ledgers and the `zip_md5` audit column; it is
//! used for change detection only, never for integrity against an adversary.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Size of each read when streaming a file through the hasher (1 MiB).
pub const CHUNK_SIZE: usize = 1 << 20;

/// Hex-encoded content digest of a byte sequence.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{_0}")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Number of hex characters in a digest.
    pub const LENGTH: usize = 32;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest of an in-memory byte slice.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(Md5::digest(bytes.as_ref())))
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for ContentDigest {
    type Err = crate::error::Error;

    /// Parses a digest, tolerating surrounding whitespace and uppercase hex.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != Self::LENGTH || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            exn::bail!(ErrorKind::InvalidDigest(s.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }
}

/// Fold everything `reader` yields into a digest, `chunk_size` bytes at a time.
///
/// The result only depends on the bytes read, never on `chunk_size`.
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> std::io::Result<ContentDigest> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(ContentDigest(hex::encode(hasher.finalize())))
}

/// Digest of a file's contents, streamed in [`CHUNK_SIZE`] reads.
#[instrument(level = "trace", skip_all, fields(path = %path.as_ref().display()))]
pub fn hash_file(path: impl AsRef<Path>) -> Result<ContentDigest> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
    Ok(hash_reader(file, CHUNK_SIZE).map_err(|e| ErrorKind::io(e, path))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    const HELLO_MD5: &str = "65a8e27d8879283831b664bd8b7f0ad4";

    #[test]
    fn known_digest() {
        assert_eq!(ContentDigest::of(b"Hello, World!").as_str(), HELLO_MD5);
        assert_eq!(ContentDigest::of(b"").as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(64)]
    #[case(4096)]
    #[case(CHUNK_SIZE)]
    fn chunk_size_does_not_change_digest(#[case] chunk_size: usize) {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = ContentDigest::of(&data);
        assert_eq!(hash_reader(Cursor::new(&data), chunk_size).unwrap(), expected);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(hash_reader(Cursor::new(b"Hello, World!"), 0).unwrap().as_str(), HELLO_MD5);
    }

    #[test]
    fn hash_file_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game123.zip");
        std::fs::write(&path, b"Hello, World!").unwrap();
        assert_eq!(hash_file(&path).unwrap().as_str(), HELLO_MD5);
    }

    #[test]
    fn hash_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(dir.path().join("missing.zip")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case(HELLO_MD5, true)]
    #[case("65A8E27D8879283831B664BD8B7F0AD4", true)]
    #[case("  65a8e27d8879283831b664bd8b7f0ad4\n", true)]
    #[case("65a8e27d", false)]
    #[case("zz a8e27d8879283831b664bd8b7f0ad4", false)]
    #[case("", false)]
    fn parse_digest(#[case] input: &str, #[case] valid: bool) {
        let parsed = input.parse::<ContentDigest>();
        assert_eq!(parsed.is_ok(), valid);
        if let Ok(digest) = parsed {
            assert_eq!(digest.as_str(), HELLO_MD5);
        }
    }
}
