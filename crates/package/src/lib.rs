//! Manifest packages: validation and cleaning.
//!
//! A *manifest package* is a zip archive holding at least one script entry
//! and at least one manifest entry, as decided by [`PackageRules`]. This crate
//! provides:
//!
//! - **Validation** ([`is_manifest_package`], [`Listing`]) from the archive's
//!   central directory alone, without extracting anything.
//! - **Cleaning** ([`clean`]) which extracts into a private workspace, strips
//!   full-line comments from scripts, drops documentation files and repacks
//!   the rest into a byte-for-byte reproducible archive.

mod clean;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod validate;

pub use crate::clean::{CleanReport, CleanedArtifact, FileAction, clean, package_id, strip_comments};
pub use crate::validate::{Listing, is_manifest_package};

/// Extension (without the dot) of the archives this crate reads and writes.
pub const ARCHIVE_EXTENSION: &str = "zip";
/// Deflate level used when repacking.
pub const DEFLATE_LEVEL: i64 = 6;

/// Naming conventions that decide what a package contains and how it is
/// cleaned. All comparisons are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct PackageRules {
    /// Entries ending with this are scripts (stripped of comment lines).
    pub script_suffix: String,
    /// Entries ending with this are manifests.
    pub manifest_suffix: String,
    /// Script lines starting with this, after leading whitespace, are removed.
    pub comment_marker: String,
    /// Files whose name starts with this are documentation and are removed.
    pub documentation_prefix: String,
}

impl Default for PackageRules {
    fn default() -> Self {
        Self {
            script_suffix: ".lua".to_string(),
            manifest_suffix: ".manifest".to_string(),
            comment_marker: "--".to_string(),
            documentation_prefix: "readme".to_string(),
        }
    }
}

impl PackageRules {
    pub fn is_script(&self, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.script_suffix.to_lowercase())
    }

    pub fn is_manifest(&self, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.manifest_suffix.to_lowercase())
    }

    /// `file_name` is the bare file name, not a path within the archive.
    pub fn is_documentation(&self, file_name: &str) -> bool {
        file_name.to_lowercase().starts_with(&self.documentation_prefix.to_lowercase())
    }
}
