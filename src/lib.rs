// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! pipcook - framework artifacts and pipeline descriptors
//!
//! Pipcook ships ML frameworks as prebuilt zip artifacts, one per runtime
//! combination, on a mirror. This crate finds the right artifact for the
//! current machine, fetches and unpacks it, and models the descriptors
//! (frameworks, scripts, pipelines) the rest of the toolchain exchanges.
//!
//! **RuntimeInfo** -> **Locator** -> **Fetch & Unpack** -> **PipcookFramework**
//!
//! # Core Modules
//!
//! - [`locator`] - Mirror URL for a framework on a given runtime
//! - [`fetch`] - Protocol-aware download, extraction and copy
//! - [`framework`] - Install a framework and check it against the runtime
//! - [`types`] - Descriptor model (frameworks, scripts, pipelines)
//! - [`pipeline`] - Load pipeline definitions and resolve their scripts
//! - [`runtime`] - Python/node versions, platform and arch of this machine
//! - [`config`] - User configuration and environment overrides

pub mod config;
pub mod fetch;
pub mod framework;
pub mod locator;
pub mod pipeline;
pub mod runtime;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigError, PipcookConfig};
pub use fetch::{
    classify, AcquireStage, ExtractError, FetchEngine, FetchError, ProgressReporter, Source,
    TransferEvent, TransferId, TransferUpdate,
};
pub use framework::{FrameworkError, FrameworkInstaller};
pub use locator::{FrameworkLocator, DEFAULT_MIRROR};
pub use pipeline::{resolve_scripts, PipelineError};
pub use runtime::RuntimeInfo;
pub use types::{
    Artifact, ArtifactError, PackageType, PipcookFramework, PipcookScript, PipelineMeta,
    ScriptConfig, ScriptType,
};
pub use utils::generate_id;
