// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Descriptor model shared by the locator, the fetch engine and pipeline tooling.
//!
//! Every type here is a passive value object. Field names on the wire are
//! camelCase (`dataSource`, `nodeVersion`, ...) because pipeline loaders and
//! script runners outside this crate read the same JSON.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::runtime::RuntimeInfo;

/// Sub-path for python packages inside a framework when none is configured.
pub const DEFAULT_PYTHON_PACKAGE_PATH: &str = "site-packages";

/// Sub-path for js modules inside a framework when none is configured.
pub const DEFAULT_JS_PACKAGE_PATH: &str = "node_modules";

/// Pipeline spec version assumed when a definition omits it.
pub const DEFAULT_SPEC_VERSION: &str = "2.0";

/// Role of a script inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    /// Fetches the raw data
    DataSource,
    /// Transforms the output of the previous stage
    Dataflow,
    /// Defines, trains and evaluates the model
    Model,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataSource => "DataSource",
            Self::Dataflow => "Dataflow",
            Self::Model => "Model",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query parameter value. Keys repeated in a query string collect into a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// The first value, which is the only one for [`QueryValue::Single`].
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                let existing = std::mem::take(existing);
                *self = Self::Multiple(vec![existing, value]);
            }
            Self::Multiple(values) => values.push(value),
        }
    }
}

/// Parsed query parameters attached to a script URL, in order of first appearance.
pub type ScriptQuery = IndexMap<String, QueryValue>;

/// Parse the query string of `url` into a [`ScriptQuery`].
pub fn parse_query(url: &Url) -> ScriptQuery {
    let mut query = ScriptQuery::new();
    for (key, value) in url.query_pairs() {
        let value = value.into_owned();
        match query.get_mut(key.as_ref()) {
            Some(existing) => existing.push(value),
            None => {
                query.insert(key.into_owned(), QueryValue::Single(value));
            }
        }
    }
    query
}

/// A single pipeline stage's script reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipcookScript {
    /// Script identifier, the last segment of its source URL
    pub name: String,
    /// Where the script lives on disk
    pub path: PathBuf,
    /// Stage role
    #[serde(rename = "type")]
    pub script_type: ScriptType,
    /// Parameters from the source URL's query string
    #[serde(default)]
    pub query: ScriptQuery,
}

impl PipcookScript {
    /// Describe the script behind `url`, stored at `path`.
    pub fn from_url(url: &Url, script_type: ScriptType, path: impl Into<PathBuf>) -> Self {
        Self {
            name: script_name(url),
            path: path.into(),
            script_type,
            query: parse_query(url),
        }
    }
}

/// Name of the script behind `url`: its last non-empty path segment, or the host.
pub fn script_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| {
            percent_encoding::percent_decode_str(segment)
                .decode_utf8_lossy()
                .into_owned()
        })
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Interop runtime a framework package targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// Python package, imported through the python bridge
    Python,
    /// Js module, imported with `import`
    Js,
}

/// A runtime constraint that an installed framework does not satisfy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("framework requires {field} `{required}`, runtime has `{actual}`")]
pub struct Incompatibility {
    pub field: &'static str,
    pub required: String,
    pub actual: String,
}

/// Describes one installed framework artifact.
///
/// Constraint fields (`arch`, `platform`, `node_version`, `napi_version`,
/// `python_version`) are wildcards when `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipcookFramework {
    /// Install directory. Empty in the `framework.json` shipped inside an artifact.
    #[serde(default)]
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    pub version: String,
    /// x64, arm64, ia32 ...
    #[serde(default)]
    pub arch: Option<String>,
    /// darwin, win32, linux ...
    #[serde(default)]
    pub platform: Option<String>,
    /// Semver requirement on the node version
    #[serde(default)]
    pub node_version: Option<String>,
    #[serde(default)]
    pub napi_version: Option<u32>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub python_package_path: Option<String>,
    #[serde(default)]
    pub js_package_path: Option<String>,
}

impl PipcookFramework {
    /// A copy of this record pointing at `path`.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn python_package_dir(&self) -> PathBuf {
        self.package_dir(PackageType::Python)
    }

    pub fn js_package_dir(&self) -> PathBuf {
        self.package_dir(PackageType::Js)
    }

    /// Directory holding packages for the given interop runtime.
    pub fn package_dir(&self, package_type: PackageType) -> PathBuf {
        let sub_path = match package_type {
            PackageType::Python => self
                .python_package_path
                .as_deref()
                .unwrap_or(DEFAULT_PYTHON_PACKAGE_PATH),
            PackageType::Js => self
                .js_package_path
                .as_deref()
                .unwrap_or(DEFAULT_JS_PACKAGE_PATH),
        };
        self.path.join(sub_path)
    }

    /// Check every non-null constraint against `runtime`.
    pub fn check_compatibility(&self, runtime: &RuntimeInfo) -> Result<(), Incompatibility> {
        let mismatch = |field: &'static str, required: &str, actual: &str| Incompatibility {
            field,
            required: required.to_string(),
            actual: actual.to_string(),
        };

        if let Some(arch) = &self.arch {
            if *arch != runtime.arch {
                return Err(mismatch("arch", arch, &runtime.arch));
            }
        }
        if let Some(platform) = &self.platform {
            if *platform != runtime.platform {
                return Err(mismatch("platform", platform, &runtime.platform));
            }
        }
        if let Some(napi) = self.napi_version {
            if napi != runtime.napi_version {
                return Err(mismatch(
                    "napiVersion",
                    &napi.to_string(),
                    &runtime.napi_version.to_string(),
                ));
            }
        }
        if let Some(node) = &self.node_version {
            if !node_version_matches(node, &runtime.node_version) {
                return Err(mismatch("nodeVersion", node, &runtime.node_version));
            }
        }
        if let Some(python) = &self.python_version {
            if !python_version_matches(python, &runtime.python_version) {
                return Err(mismatch("pythonVersion", python, &runtime.python_version));
            }
        }
        Ok(())
    }

    pub fn is_compatible_with(&self, runtime: &RuntimeInfo) -> bool {
        self.check_compatibility(runtime).is_ok()
    }
}

/// `required` is a semver requirement; anything unparseable compares literally.
fn node_version_matches(required: &str, actual: &str) -> bool {
    let actual_trimmed = actual.trim_start_matches('v');
    match (
        semver::VersionReq::parse(required),
        semver::Version::parse(actual_trimmed),
    ) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => required == actual || required == actual_trimmed,
    }
}

/// A two-component requirement (`3.9`) matches any patch release of it.
fn python_version_matches(required: &str, actual: &str) -> bool {
    if required == actual {
        return true;
    }
    required.split('.').count() == 2 && actual.starts_with(&format!("{required}."))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The scripts composing one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    /// Absent when the data is already materialized
    #[serde(default)]
    pub data_source: Option<PipcookScript>,
    /// Applied in order, each consuming the previous stage's output
    #[serde(default, deserialize_with = "null_as_default")]
    pub dataflow: Vec<PipcookScript>,
    pub model: PipcookScript,
}

impl ScriptConfig {
    /// All stages in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &PipcookScript> {
        self.data_source
            .iter()
            .chain(self.dataflow.iter())
            .chain(std::iter::once(&self.model))
    }
}

/// Errors from parsing an artifact `processor` reference.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact processor is empty")]
    EmptyProcessor,

    #[error("artifact processor `{0}` has no `@<version>` suffix")]
    MissingVersion(String),

    #[error("artifact processor `{0}` has an empty plugin name")]
    EmptyName(String),

    #[error("artifact processor `{processor}` has an invalid version")]
    InvalidVersion {
        processor: String,
        #[source]
        source: semver::Error,
    },
}

/// Name and version of an artifact plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlugin {
    pub name: String,
    pub version: semver::Version,
}

/// Output-plugin reference plus plugin-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// `<name>@<semver>`, e.g. `pipcook-ali-oss-uploader@0.0.1`
    pub processor: String,
    /// Passed to the plugin as-is, validated by the plugin
    #[serde(flatten)]
    pub options: IndexMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(processor: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            options: IndexMap::new(),
        }
    }

    /// Split `processor` at its last `@` so scoped names like `@scope/pkg@1.0.0` work.
    pub fn plugin(&self) -> Result<ArtifactPlugin, ArtifactError> {
        let processor = self.processor.trim();
        if processor.is_empty() {
            return Err(ArtifactError::EmptyProcessor);
        }
        let (name, version) = processor
            .rsplit_once('@')
            .ok_or_else(|| ArtifactError::MissingVersion(processor.to_string()))?;
        if name.is_empty() {
            return Err(ArtifactError::EmptyName(processor.to_string()));
        }
        let version =
            semver::Version::parse(version).map_err(|source| ArtifactError::InvalidVersion {
                processor: processor.to_string(),
                source,
            })?;
        Ok(ArtifactPlugin {
            name: name.to_string(),
            version,
        })
    }
}

/// Top-level pipeline descriptor, read once from a pipeline definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMeta {
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    /// Data source script URL, or a SQL string
    pub data_source: String,
    #[serde(default)]
    pub dataflow: Option<Vec<String>>,
    /// Model script URL
    pub model: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
}

fn default_spec_version() -> String {
    DEFAULT_SPEC_VERSION.to_string()
}
