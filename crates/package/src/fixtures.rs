//! Archive builders for tests in this and downstream crates.

use crate::error::Result;
use crate::{CleanedArtifact, PackageRules};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Build an in-memory zip from `(name, contents)` pairs. Names ending in `/`
/// become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, SimpleFileOptions::default()).expect("add fixture directory");
            continue;
        }
        writer.start_file(*name, SimpleFileOptions::default()).expect("start fixture entry");
        writer.write_all(data).expect("write fixture entry");
    }
    writer.finish().expect("finish fixture archive").into_inner()
}

/// Write [`zip_bytes`] to `path`, creating parent directories.
pub fn write_zip(path: impl AsRef<Path>, entries: &[(&str, &[u8])]) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture parent");
    }
    fs::write(path, zip_bytes(entries)).expect("write fixture archive");
}

/// Read every file entry of the archive at `path`, keyed by entry name.
pub fn read_zip(path: impl AsRef<Path>) -> BTreeMap<String, Vec<u8>> {
    let file = fs::File::open(path).expect("open archive");
    let mut zip = ZipArchive::new(file).expect("read archive");
    let mut files = BTreeMap::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).expect("read entry");
        if entry.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry contents");
        files.insert(entry.name().to_owned(), data);
    }
    files
}

/// A valid package: one script with comments, one manifest, one readme.
pub fn sample_package(path: impl AsRef<Path>) {
    write_zip(
        path,
        &[
            ("main.lua", b"-- comment\nprint(1)\n  -- indented comment\nprint(2)\n"),
            ("meta.manifest", b"name=sample\n"),
            ("README.md", b"read me"),
        ],
    );
}

/// Reason recorded by [`clean_failing_scripts`] against every script.
pub const SCRIPT_FAILURE: &str = "disk full";

/// Clean like [`clean`](crate::clean), except that every script fails to
/// strip with [`SCRIPT_FAILURE`] and is packed as extracted.
pub fn clean_failing_scripts(archive: impl AsRef<Path>, rules: &PackageRules) -> Result<CleanedArtifact> {
    crate::clean::clean_with(archive.as_ref(), rules, |_, _| Err(io::Error::other(SCRIPT_FAILURE)))
}
