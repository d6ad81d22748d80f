//! Filesystem primitives shared by the rest of the workspace.
//!
//! - [`ContentDigest`] and [`hash_file`] identify files by content, reading
//!   them in fixed-size chunks.
//! - [`sync_file`] copies a file into a destination only when the destination
//!   does not already hold the same bytes.
//! - [`list_files`] takes a flat listing of a directory, giving each file a
//!   [`Fingerprint`] that changes whenever the file does.
//! - [`validate_path`] normalizes relative paths and refuses any that would
//!   leave their root.

pub mod digest;
pub mod error;
mod local;
mod models;
mod path;
mod sync;

pub use crate::digest::{CHUNK_SIZE, ContentDigest, hash_file, hash_reader};
pub use crate::local::list_files;
pub use crate::models::{FileInfo, Fingerprint};
pub use crate::path::validate as validate_path;
pub use crate::sync::{SyncStatus, sync_file};
