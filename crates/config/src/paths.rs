use crate::Config;
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The three directories tsm works with.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum DirectoryKind {
    /// Output for cleaned packages.
    #[display("primary")]
    Primary,
    /// Second output, fed from the primary directory.
    #[display("mirror")]
    Mirror,
    /// Input polled by `tsm watch`.
    #[display("watch")]
    Watch,
}

impl DirectoryKind {
    pub const ALL: [Self; 3] = [Self::Primary, Self::Mirror, Self::Watch];

    /// Name of the file in the state directory remembering this directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Primary => "CLEAN_DIR.txt",
            Self::Mirror => "DRIVE_DIR.txt",
            Self::Watch => "WATCH_DIR.txt",
        }
    }
}

/// Both output directories, resolved, absolute and known to exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directories {
    pub primary: PathBuf,
    pub mirror: PathBuf,
}

fn read_remembered(path: &Path) -> Result<Option<PathBuf>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => exn::bail!(ErrorKind::Io(path.to_path_buf(), e)),
    };
    let value = contents.trim().trim_matches('"');
    Ok((!value.is_empty()).then(|| PathBuf::from(value)))
}

impl Config {
    pub fn configured(&self, kind: DirectoryKind) -> Option<&Path> {
        match kind {
            DirectoryKind::Primary => self.primary_dir.as_deref(),
            DirectoryKind::Mirror => self.mirror_dir.as_deref(),
            DirectoryKind::Watch => self.watch_dir.as_deref(),
        }
    }

    pub fn remembered_path(&self, kind: DirectoryKind) -> PathBuf {
        self.state_dir.join(kind.file_name())
    }

    /// The directory remembered for `kind`, if any. Not checked for
    /// existence.
    pub fn remembered(&self, kind: DirectoryKind) -> Result<Option<PathBuf>> {
        read_remembered(&self.remembered_path(kind))
    }

    /// Find the directory to use for `kind`: the configured one if set,
    /// otherwise the remembered one.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::DirectoryMissing`] when neither is set or the directory
    /// does not exist.
    pub fn resolve(&self, kind: DirectoryKind) -> Result<PathBuf> {
        let candidate = match self.configured(kind) {
            Some(dir) => Some(dir.to_path_buf()),
            None => self.remembered(kind).or_raise(|| ErrorKind::DirectoryMissing(kind))?,
        };
        match candidate {
            Some(dir) if dir.is_dir() => Ok(std::path::absolute(&dir).unwrap_or(dir)),
            Some(dir) => {
                tracing::debug!(%kind, dir = %dir.display(), "Directory does not exist");
                exn::bail!(ErrorKind::DirectoryMissing(kind))
            },
            None => exn::bail!(ErrorKind::DirectoryMissing(kind)),
        }
    }

    /// Resolve both output directories at once.
    pub fn directories(&self) -> Result<Directories> {
        Ok(Directories { primary: self.resolve(DirectoryKind::Primary)?, mirror: self.resolve(DirectoryKind::Mirror)? })
    }

    /// Persist `dir` as the directory for `kind`, returning its absolute
    /// form. The directory must exist.
    pub fn remember(&self, kind: DirectoryKind, dir: &Path) -> Result<PathBuf> {
        if !dir.is_dir() {
            exn::bail!(ErrorKind::DirectoryMissing(kind));
        }
        let absolute = std::path::absolute(dir).map_err(|e| ErrorKind::Io(dir.to_path_buf(), e))?;
        let file = self.remembered_path(kind);
        fs::create_dir_all(&self.state_dir).map_err(|e| ErrorKind::Io(self.state_dir.clone(), e))?;
        fs::write(&file, absolute.to_string_lossy().as_bytes()).map_err(|e| ErrorKind::Io(file.clone(), e))?;
        tracing::info!(%kind, dir = %absolute.display(), "Directory remembered");
        Ok(absolute)
    }
}
