use crate::PackageRules;
use crate::error::{ErrorKind, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::instrument;
use zip::ZipArchive;

/// Entry names of an archive, read from its central directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    names: Vec<String>,
}

impl Listing {
    /// Read the entry listing of the archive at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ErrorKind::Io(path.to_path_buf(), e))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(ErrorKind::Archive)?;
        Ok(Self { names: archive.file_names().map(str::to_owned).collect() })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_script(&self, rules: &PackageRules) -> bool {
        self.names.iter().any(|n| rules.is_script(n))
    }

    pub fn has_manifest(&self, rules: &PackageRules) -> bool {
        self.names.iter().any(|n| rules.is_manifest(n))
    }

    /// At least one script entry *and* at least one manifest entry.
    pub fn is_manifest_package(&self, rules: &PackageRules) -> bool {
        self.has_script(rules) && self.has_manifest(rules)
    }
}

/// Decide whether the file at `path` is a manifest package.
///
/// Total: a file that can't be opened or isn't a readable zip is simply not a
/// manifest package. Nothing is extracted and nothing is written.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn is_manifest_package(path: impl AsRef<Path>, rules: &PackageRules) -> bool {
    match Listing::read(path) {
        Ok(listing) => listing.is_manifest_package(rules),
        Err(e) => {
            tracing::debug!(error = ?e, "Archive listing unavailable");
            false
        },
    }
}
