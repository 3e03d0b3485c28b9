// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Protocol-aware fetch and unpack.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use super::error::FetchError;
use super::extract::{extract_zip, is_zip};
use super::progress::{NoProgress, ProgressReporter};
use super::transfer;
use crate::utils::generate_id;

/// A classified acquisition source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `file:` URL of a `.zip`, extracted in place
    LocalArchive(PathBuf),
    /// `file:` URL of anything else, copied recursively
    LocalPath(PathBuf),
    /// `http(s):` URL of a `.zip`, downloaded to scratch then extracted
    RemoteArchive(Url),
    /// `http(s):` URL of anything else, downloaded as a single file
    RemoteFile(Url),
}

impl Source {
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::LocalArchive(_) | Self::RemoteArchive(_))
    }
}

/// Classify `source` by scheme and extension. Performs no I/O.
pub fn classify(source: &str) -> Result<Source, FetchError> {
    let url = Url::parse(source).map_err(|e| FetchError::invalid_source(source, e.to_string()))?;

    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| FetchError::invalid_source(source, "file url has no local path"))?;
            let is_archive = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_zip);
            Ok(if is_archive {
                Source::LocalArchive(path)
            } else {
                Source::LocalPath(path)
            })
        }
        "http" | "https" => {
            let file_name = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default();
            Ok(if is_zip(file_name) {
                Source::RemoteArchive(url)
            } else {
                Source::RemoteFile(url)
            })
        }
        scheme => Err(FetchError::UnsupportedScheme {
            url: source.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// Steps of one `acquire` call, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStage {
    Resolved,
    Fetching,
    Extracting,
    Cleaned,
    Done,
}

impl fmt::Display for AcquireStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolved => "resolved",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Cleaned => "cleaned",
            Self::Done => "done",
        })
    }
}

/// Retrieves artifacts into target directories.
///
/// The scratch directory holds transient downloads before extraction. It may
/// be shared by concurrent `acquire` calls; each call uses a random file name.
#[derive(Clone)]
pub struct FetchEngine {
    client: Client,
    scratch_dir: PathBuf,
    progress: Arc<dyn ProgressReporter>,
}

impl FetchEngine {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            scratch_dir: scratch_dir.into(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, ...).
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Send download progress to `reporter`.
    #[must_use]
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Stream `url` into `dest`. See [`transfer::fetch`].
    pub async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        transfer::fetch(&self.client, url, dest).await
    }

    /// Stream `url` into `dest` with progress, deleting `dest` on failure.
    pub async fn fetch_with_progress(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        transfer::fetch_with_progress(&self.client, url, dest, self.progress.as_ref()).await
    }

    /// Unpack the zip at `archive` into `target` on the blocking pool.
    pub async fn extract(&self, archive: &Path, target: &Path) -> Result<usize, FetchError> {
        let archive = archive.to_path_buf();
        let target = target.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || extract_zip(&archive, &target)).await??;
        Ok(entries)
    }

    /// Fetch `source` into `target`, dispatching on scheme and extension.
    ///
    /// | source | action |
    /// | --- | --- |
    /// | `file:` `.zip` | extract into `target` |
    /// | `file:` other | copy recursively to `target` |
    /// | `http(s):` `.zip` | download to scratch, extract, delete the temp file |
    /// | `http(s):` other | download to `target` as a single file |
    ///
    /// Unsupported schemes and unparseable URLs fail before any I/O. On error
    /// `target` may be partially populated.
    pub async fn acquire(&self, source: &str, target: &Path) -> Result<Source, FetchError> {
        let span = info_span!("acquire", source, target = %target.display());
        async {
            let classified = classify(source)?;
            debug!(stage = %AcquireStage::Resolved, kind = ?classified);

            match &classified {
                Source::LocalArchive(path) => {
                    debug!(stage = %AcquireStage::Extracting);
                    self.extract(path, target).await?;
                }
                Source::LocalPath(path) => {
                    debug!(stage = %AcquireStage::Fetching);
                    copy_path(path, target).await?;
                }
                Source::RemoteArchive(url) => {
                    self.fetch_archive(url, target).await?;
                }
                Source::RemoteFile(url) => {
                    debug!(stage = %AcquireStage::Fetching);
                    self.fetch_with_progress(url, target).await?;
                }
            }

            info!(stage = %AcquireStage::Done, "Acquired artifact");
            Ok(classified)
        }
        .instrument(span)
        .await
    }

    async fn fetch_archive(&self, url: &Url, target: &Path) -> Result<(), FetchError> {
        let tmp_path = self.scratch_dir.join(generate_id());

        debug!(stage = %AcquireStage::Fetching, tmp = %tmp_path.display());
        self.fetch_with_progress(url, &tmp_path).await?;

        debug!(stage = %AcquireStage::Extracting);
        let extracted = self.extract(&tmp_path, target).await;

        remove_scratch_file(&tmp_path).await;
        debug!(stage = %AcquireStage::Cleaned);

        extracted.map(|_| ())
    }
}

/// Delete a scratch download. Failures are logged and ignored.
async fn remove_scratch_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary download"),
    }
}

/// Copy a local file or directory tree to `target`.
///
/// A directory's contents are merged into `target`; a file is copied to the
/// path `target` itself.
async fn copy_path(source: &Path, target: &Path) -> Result<(), FetchError> {
    let source = source.to_path_buf();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || copy_path_blocking(&source, &target)).await?
}

fn copy_path_blocking(source: &Path, target: &Path) -> Result<(), FetchError> {
    let metadata = std::fs::metadata(source).map_err(|e| FetchError::io(source, e))?;

    if metadata.is_dir() {
        std::fs::create_dir_all(target).map_err(|e| FetchError::io(target, e))?;
        let options = fs_extra::dir::CopyOptions::new()
            .content_only(true)
            .overwrite(true);
        fs_extra::dir::copy(source, target, &options).map_err(|e| FetchError::Copy {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: e,
        })?;
    } else {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        std::fs::copy(source, target).map_err(|e| FetchError::io(target, e))?;
    }
    Ok(())
}
