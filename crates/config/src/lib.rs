//! Layered configuration for tsm.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A config file: `--config <FILE>` if given, otherwise `config.toml` and
//!    `config.yaml` in the platform config directory.
//! 3. `TSM_*` environment variables; nested keys use `__`
//!    (`TSM_RULES__SCRIPT_SUFFIX=.luau`).
//! 4. Command-line [`Overrides`].
//!
//! Directories that are not configured anywhere fall back to the
//! single-line path files remembered in the state directory (see
//! [`Config::resolve`] and [`Config::remember`]).

pub mod error;
mod paths;

pub use crate::paths::{DirectoryKind, Directories};

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tsm_package::PackageRules;

const APPLICATION: &str = "tsm";
const ENV_PREFIX: &str = "TSM_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

/// Where configuration files are looked for when no `--config` is given.
pub fn default_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Where the ledger, audit log and remembered directories live by default.
pub fn default_state_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Receives every cleaned package.
    pub primary_dir: Option<PathBuf>,
    /// Receives a copy of whatever the primary directory holds.
    pub mirror_dir: Option<PathBuf>,
    /// Polled by `tsm watch`.
    pub watch_dir: Option<PathBuf>,
    pub state_dir: PathBuf,
    /// Seconds between two scans of the watch directory.
    pub poll_interval: u64,
    pub rules: PackageRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_dir: None,
            mirror_dir: None,
            watch_dir: None,
            state_dir: default_state_dir(),
            poll_interval: 5,
            rules: PackageRules::default(),
        }
    }
}

/// Values given on the command line. `None` leaves lower layers alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

fn file_provider(path: &Path) -> Figment {
    let extension = path.extension().map(|e| e.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some("yaml" | "yml") => Figment::from(Yaml::file(path)),
        Some("json") => Figment::from(Json::file(path)),
        _ => Figment::from(Toml::file(path)),
    }
}

impl Config {
    /// The merged configuration sources, before extraction.
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match config_file {
            Some(path) => figment = figment.merge(file_provider(path)),
            None => {
                if let Some(dir) = default_config_dir() {
                    figment = figment.merge(Toml::file(dir.join("config.toml"))).merge(Yaml::file(dir.join("config.yaml")));
                }
            },
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).merge(Serialized::defaults(overrides))
    }

    /// Load the configuration from every source.
    ///
    /// # Errors
    ///
    /// An explicit `config_file` that doesn't exist, or any source holding
    /// values of the wrong shape.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        if let Some(path) = config_file.filter(|p| !p.is_file()) {
            exn::bail!(ErrorKind::ConfigFile(path.to_path_buf()));
        }
        let config: Self = Self::figment(config_file, overrides).extract().map_err(ErrorKind::Load)?;
        tracing::debug!(state_dir = %config.state_dir.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}
