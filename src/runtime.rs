// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime facts that select which framework artifact fits this machine.
//!
//! Framework artifacts are built per python minor version, node major version,
//! N-API version, OS platform and CPU architecture. [`RuntimeInfo`] carries
//! those facts explicitly so the locator stays a pure function; tests build
//! one with [`RuntimeInfo::new`], the CLI calls [`RuntimeInfo::detect`].
//!
//! Platform and arch use node's names (`linux`, `darwin`, `win32`; `x64`,
//! `arm64`, ...) because that is how artifacts are published on the mirror.

use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Overrides the detected python version.
pub const PYTHON_VERSION_ENV: &str = "PIPCOOK_PYTHON_VERSION";
/// Overrides the detected node version.
pub const NODE_VERSION_ENV: &str = "PIPCOOK_NODE_VERSION";
/// Overrides the detected N-API version.
pub const NAPI_VERSION_ENV: &str = "PIPCOOK_NAPI_VERSION";

/// Interpreter versions, OS platform and architecture of the installing runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// e.g. "3.9.7"
    pub python_version: String,
    /// e.g. "16.14.0", without a leading `v`
    pub node_version: String,
    pub napi_version: u32,
    pub platform: String,
    pub arch: String,
}

impl RuntimeInfo {
    pub fn new(
        python_version: impl Into<String>,
        node_version: impl Into<String>,
        napi_version: u32,
        platform: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            python_version: python_version.into(),
            node_version: node_version.into(),
            napi_version,
            platform: platform.into(),
            arch: arch.into(),
        }
    }

    /// Detect the runtime of this process.
    ///
    /// Never fails: facts that cannot be determined are left empty (napi `0`)
    /// and logged, which yields a URL the mirror will not serve rather than
    /// an error here.
    pub fn detect() -> Self {
        let python_version = std::env::var(PYTHON_VERSION_ENV)
            .ok()
            .or_else(detect_python_version)
            .unwrap_or_else(|| {
                warn!("Could not determine python version");
                String::new()
            });

        let (node_detected, napi_detected) = detect_node_versions().unzip();

        let node_version = std::env::var(NODE_VERSION_ENV)
            .ok()
            .or(node_detected)
            .map(|v| v.trim_start_matches('v').to_string())
            .unwrap_or_else(|| {
                warn!("Could not determine node version");
                String::new()
            });

        let napi_version = std::env::var(NAPI_VERSION_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .or(napi_detected)
            .unwrap_or_else(|| {
                warn!("Could not determine N-API version");
                0
            });

        let runtime = Self {
            python_version,
            node_version,
            napi_version,
            platform: node_platform(std::env::consts::OS).to_string(),
            arch: node_arch(std::env::consts::ARCH).to_string(),
        };
        debug!(?runtime, "Detected runtime");
        runtime
    }
}

/// Map a Rust target OS name to node's `os.platform()` name.
pub fn node_platform(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        "solaris" => "sunos",
        other => other,
    }
}

/// Map a Rust target arch name to node's `os.arch()` name.
pub fn node_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Pull the version out of `python --version` output ("Python 3.9.7").
fn parse_python_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
}

fn detect_python_version() -> Option<String> {
    ["python3", "python"].iter().find_map(|bin| {
        let out = Command::new(bin).arg("--version").output().ok()?;
        if !out.status.success() {
            return None;
        }
        // Python 2 prints its version on stderr.
        let text = if out.stdout.is_empty() {
            String::from_utf8_lossy(&out.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&out.stdout).into_owned()
        };
        parse_python_version(&text)
    })
}

/// Parse `"<node> <napi>"` as printed by the `node -e` version query.
fn parse_node_versions(output: &str) -> Option<(String, u32)> {
    let mut parts = output.split_whitespace();
    let node = parts.next()?.to_string();
    let napi = parts.next()?.parse().ok()?;
    Some((node, napi))
}

fn detect_node_versions() -> Option<(String, u32)> {
    let out = Command::new("node")
        .args(["-p", "process.versions.node + ' ' + process.versions.napi"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    parse_node_versions(&String::from_utf8_lossy(&out.stdout))
}
