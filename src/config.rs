// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User configuration.
//!
//! Stored as JSON at `~/.pipcook/config.json`. Every field is optional in the
//! file; missing fields take their defaults. Environment variables override
//! the file:
//!
//! | variable | field |
//! | --- | --- |
//! | `PIPCOOK_HOME` | `home_dir` (and the default `scratch_dir` under it) |
//! | `PIPCOOK_TMPDIR` | `scratch_dir` |
//! | `PIPCOOK_MIRROR` | `mirror` |

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::locator::DEFAULT_MIRROR;

/// Name of the pipcook home directory under the user's home.
pub const HOME_DIR_NAME: &str = ".pipcook";
/// Scratch directory name under the pipcook home.
pub const SCRATCH_DIR_NAME: &str = ".tmp";
/// Config file name under the pipcook home.
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const HOME_ENV: &str = "PIPCOOK_HOME";
pub const TMPDIR_ENV: &str = "PIPCOOK_TMPDIR";
pub const MIRROR_ENV: &str = "PIPCOOK_MIRROR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find home directory")]
    NoHomeDir,

    #[error("failed to access config at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings shared by the CLI and library callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipcookConfig {
    /// Root of pipcook's on-disk state
    pub home_dir: PathBuf,
    /// Transient downloads live here before extraction
    pub scratch_dir: PathBuf,
    /// Base URL of the framework mirror
    pub mirror: String,
    /// Draw a progress bar during downloads (default: true)
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_show_progress() -> bool {
    true
}

/// On-disk form: every field optional so partial files load.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    home_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    mirror: Option<String>,
    show_progress: Option<bool>,
}

impl PipcookConfig {
    /// Defaults rooted at `home_dir`.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        Self {
            scratch_dir: home_dir.join(SCRATCH_DIR_NAME),
            home_dir,
            mirror: DEFAULT_MIRROR.to_string(),
            show_progress: default_show_progress(),
        }
    }

    /// Defaults rooted at `~/.pipcook`.
    pub fn default_for_user() -> Result<Self, ConfigError> {
        Ok(Self::with_home(default_home_dir()?))
    }

    pub fn config_path(&self) -> PathBuf {
        self.home_dir.join(CONFIG_FILE_NAME)
    }

    /// Load the user's config, applying environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let home_dir = match std::env::var_os(HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => default_home_dir()?,
        };
        let mut config = Self::load_from(&home_dir.join(CONFIG_FILE_NAME), &home_dir)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read `path`, filling missing fields with defaults rooted at `home_dir`.
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path, home_dir: &Path) -> Result<Self, ConfigError> {
        let file = if path.exists() {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            ConfigFile::default()
        };

        let home_dir = file.home_dir.unwrap_or_else(|| home_dir.to_path_buf());
        let defaults = Self::with_home(&home_dir);
        Ok(Self {
            scratch_dir: file.scratch_dir.unwrap_or(defaults.scratch_dir),
            mirror: file.mirror.unwrap_or(defaults.mirror),
            show_progress: file.show_progress.unwrap_or(defaults.show_progress),
            home_dir,
        })
    }

    /// Apply `PIPCOOK_*` overrides read through `lookup`.
    ///
    /// A new home moves the scratch dir with it unless `PIPCOOK_TMPDIR` is set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(home) = non_empty(HOME_ENV) {
            let home = PathBuf::from(home);
            if self.scratch_dir == self.home_dir.join(SCRATCH_DIR_NAME) {
                self.scratch_dir = home.join(SCRATCH_DIR_NAME);
            }
            self.home_dir = home;
        }
        if let Some(tmp) = non_empty(TMPDIR_ENV) {
            self.scratch_dir = PathBuf::from(tmp);
        }
        if let Some(mirror) = non_empty(MIRROR_ENV) {
            self.mirror = mirror;
        }
    }

    /// Write this config as pretty JSON to [`config_path`](Self::config_path).
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.config_path();
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.home_dir).map_err(io_err)?;
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(io_err)?;
        Ok(())
    }
}

fn default_home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(HOME_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}
