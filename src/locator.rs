// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mirror URL resolution for framework artifacts.
//!
//! Artifacts are published under
//! `<mirror>/node<major>-py<major><minor>/<name>-<platform>-<arch>-v<napi>.zip`.
//! Resolution is a pure string computation over a [`RuntimeInfo`].
//!
//! # Example
//!
//! ```
//! use pipcook::locator::FrameworkLocator;
//! use pipcook::runtime::RuntimeInfo;
//!
//! let locator = FrameworkLocator::parse("https://mirror.example.com/framework/").unwrap();
//! let runtime = RuntimeInfo::new("3.9.7", "16.14.0", 8, "linux", "x64");
//! let url = locator.locate("tfjs", &runtime).unwrap();
//! assert_eq!(
//!     url.as_str(),
//!     "https://mirror.example.com/framework/node16-py39/tfjs-linux-x64-v8.zip"
//! );
//! ```

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::fetch::FetchError;
use crate::runtime::RuntimeInfo;

/// Mirror used when none is configured.
pub const DEFAULT_MIRROR: &str = "https://pipcook-cloud.oss-cn-hangzhou.aliyuncs.com/framework/";

/// Characters `encodeURIComponent` leaves alone: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode `value` for use as a single URL path segment.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// `py<major><minor>` from a python version such as `3.9.7`.
///
/// Versions with suffixes (`3.10.0rc1`) are not normalized.
pub fn python_tag(python_version: &str) -> String {
    let mut parts = python_version.split('.');
    let major = parts.next().unwrap_or_default();
    let minor = parts.next().unwrap_or_default();
    format!("py{major}{minor}")
}

/// `node<major>` from a node version such as `16.14.0`: the text before the first `.`.
pub fn node_tag(node_version: &str) -> String {
    match node_version.find('.') {
        Some(end) => format!("node{}", &node_version[..end]),
        None => "node".to_string(),
    }
}

/// Mirror-relative path of the artifact for `name` on `runtime`.
pub fn artifact_path(name: &str, runtime: &RuntimeInfo) -> String {
    format!(
        "{}-{}/{}-{}-{}-v{}.zip",
        node_tag(&runtime.node_version),
        python_tag(&runtime.python_version),
        encode_component(name),
        runtime.platform,
        runtime.arch,
        runtime.napi_version,
    )
}

/// Resolves framework names to download URLs under a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkLocator {
    mirror: Url,
}

impl FrameworkLocator {
    pub fn new(mirror: Url) -> Self {
        Self { mirror }
    }

    /// Parse `mirror` as the base URL.
    pub fn parse(mirror: &str) -> Result<Self, FetchError> {
        let url = Url::parse(mirror).map_err(|e| FetchError::invalid_source(mirror, e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(FetchError::invalid_source(mirror, "mirror cannot be used as a base url"));
        }
        Ok(Self::new(url))
    }

    /// Use `mirror` when given, otherwise [`DEFAULT_MIRROR`].
    pub fn from_option(mirror: Option<&str>) -> Result<Self, FetchError> {
        Self::parse(mirror.unwrap_or(DEFAULT_MIRROR))
    }

    pub fn mirror(&self) -> &Url {
        &self.mirror
    }

    /// Download URL of framework `name` for `runtime`.
    ///
    /// The artifact path is resolved against the mirror like a relative link,
    /// so a mirror without a trailing slash has its last segment replaced.
    pub fn locate(&self, name: &str, runtime: &RuntimeInfo) -> Result<Url, FetchError> {
        if name.is_empty() {
            return Err(FetchError::invalid_source(
                self.mirror.as_str(),
                "framework name is empty",
            ));
        }
        let relative = format!("./{}", artifact_path(name, runtime));
        self.mirror
            .join(&relative)
            .map_err(|e| FetchError::invalid_source(relative, e.to_string()))
    }
}

impl Default for FrameworkLocator {
    /// DEFAULT_MIRROR is a constant absolute https URL, so parsing cannot fail.
    /// Callers with a configured mirror should use `FrameworkLocator::parse`.
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_MIRROR).expect("DEFAULT_MIRROR is a valid url"))
    }
}
