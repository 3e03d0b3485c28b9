// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Framework installation: locate, acquire, then read and check the descriptor.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::fetch::{FetchEngine, FetchError};
use crate::locator::FrameworkLocator;
use crate::runtime::RuntimeInfo;
use crate::types::{Incompatibility, PipcookFramework};

/// Descriptor file shipped at the root of every framework artifact.
pub const FRAMEWORK_DESCRIPTOR: &str = "framework.json";

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to read framework descriptor {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid framework descriptor {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The artifact was installed but does not fit the runtime. Its files
    /// are left in place.
    #[error("framework `{name}` is incompatible with this runtime")]
    Incompatible {
        name: String,
        #[source]
        source: Incompatibility,
    },
}

/// Installs framework artifacts for one runtime.
#[derive(Clone)]
pub struct FrameworkInstaller {
    locator: FrameworkLocator,
    engine: FetchEngine,
    runtime: RuntimeInfo,
}

impl FrameworkInstaller {
    pub fn new(locator: FrameworkLocator, engine: FetchEngine, runtime: RuntimeInfo) -> Self {
        Self {
            locator,
            engine,
            runtime,
        }
    }

    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    pub fn locator(&self) -> &FrameworkLocator {
        &self.locator
    }

    /// Install framework `name` from the mirror into `target_dir`.
    pub async fn install(
        &self,
        name: &str,
        target_dir: &Path,
    ) -> Result<PipcookFramework, FrameworkError> {
        let url = self.locator.locate(name, &self.runtime)?;
        info!(name, %url, "Installing framework");
        self.install_from(url.as_str(), target_dir).await
    }

    /// Install the framework artifact at `source` (any URL `acquire` accepts).
    pub async fn install_from(
        &self,
        source: &str,
        target_dir: &Path,
    ) -> Result<PipcookFramework, FrameworkError> {
        self.engine.acquire(source, target_dir).await?;
        let framework = load(target_dir).await?;

        if let Err(source) = framework.check_compatibility(&self.runtime) {
            warn!(name = %framework.name, error = %source, "Installed framework does not fit runtime");
            return Err(FrameworkError::Incompatible {
                name: framework.name,
                source,
            });
        }

        info!(name = %framework.name, version = %framework.version, path = %target_dir.display(), "Framework installed");
        Ok(framework)
    }
}

/// Read the descriptor of the framework installed in `dir`, with `path` set to `dir`.
pub async fn load(dir: &Path) -> Result<PipcookFramework, FrameworkError> {
    let path = dir.join(FRAMEWORK_DESCRIPTOR);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| FrameworkError::Io {
            path: path.clone(),
            source,
        })?;
    let framework: PipcookFramework =
        serde_json::from_str(&content).map_err(|source| FrameworkError::Parse { path, source })?;
    Ok(framework.with_path(dir))
}
