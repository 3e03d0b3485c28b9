// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Errors raised while resolving, fetching and unpacking artifacts.
//!
//! The variants follow the four failure classes of an acquisition: an invalid
//! source (raised before any I/O), a transfer failure, an extraction failure
//! and a filesystem failure. Underlying errors are kept as the `source` so
//! callers see them unchanged.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// Errors from the fetch & unpack engine and the locator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source could not be parsed or has no usable path.
    #[error("invalid source url `{url}`: {reason}")]
    InvalidSource { url: String, reason: String },

    /// Only `file:`, `http:` and `https:` are accepted.
    #[error("unsupported scheme `{scheme}` in `{url}`")]
    UnsupportedScheme { url: String, scheme: String },

    /// Network or stream error while downloading.
    #[error("failed to download {url}")]
    Transfer {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("failed to download {url}: {status}")]
    HttpStatus { url: Url, status: StatusCode },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Directory creation, write, copy or delete failure.
    #[error("filesystem operation failed on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: fs_extra::error::Error,
    },

    #[error("background task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_source(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while classifying the source, before any I/O.
    pub fn is_invalid_source(&self) -> bool {
        matches!(self, Self::InvalidSource { .. } | Self::UnsupportedScheme { .. })
    }
}

/// Errors emitted while unpacking an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to unpack {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid zip archive {}", path.display())]
    InvalidZip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}
