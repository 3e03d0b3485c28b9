// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streaming HTTP downloads to a file.

use std::io::ErrorKind;
use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use super::error::FetchError;
use super::progress::{NoProgress, ProgressReporter, TransferEvent, TransferId};

/// Stream `url` into `dest`, creating its parent directory.
///
/// Returns the number of bytes written. Errors are returned as they occur;
/// a partially written `dest` is left in place.
pub async fn fetch(client: &Client, url: &Url, dest: &Path) -> Result<u64, FetchError> {
    download(client, url, dest, &NoProgress).await
}

/// Like [`fetch`], reporting byte counts to `reporter`.
///
/// On failure the partially written `dest` is deleted before the original
/// error is returned.
pub async fn fetch_with_progress(
    client: &Client,
    url: &Url,
    dest: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<u64, FetchError> {
    match download(client, url, dest, reporter).await {
        Ok(received) => Ok(received),
        Err(err) => {
            remove_partial(dest).await;
            Err(err)
        }
    }
}

async fn download(
    client: &Client,
    url: &Url,
    dest: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<u64, FetchError> {
    let id = TransferId::next();
    let mut received = 0u64;
    let result = stream_to_file(client, url, dest, reporter, id, &mut received).await;
    match &result {
        Ok(()) => {
            debug!(%url, %id, dest = %dest.display(), bytes = received, "Download finished");
            reporter.report(id, TransferEvent::Finished { received });
        }
        Err(err) => {
            debug!(%url, %id, bytes = received, error = %err, "Download failed");
            reporter.report(id, TransferEvent::Failed { received });
        }
    }
    result.map(|()| received)
}

async fn stream_to_file(
    client: &Client,
    url: &Url,
    dest: &Path,
    reporter: &dyn ProgressReporter,
    id: TransferId,
    received: &mut u64,
) -> Result<(), FetchError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::io(parent, e))?;
    }

    debug!(%url, %id, dest = %dest.display(), "Starting download");
    let transfer = |source| FetchError::Transfer {
        url: url.clone(),
        source,
    };

    let response = client.get(url.clone()).send().await.map_err(transfer)?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            url: url.clone(),
            status: response.status(),
        });
    }

    let total = response.content_length();
    reporter.report(id, TransferEvent::Started { total });

    let mut file = fs::File::create(dest)
        .await
        .map_err(|e| FetchError::io(dest, e))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(transfer)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(dest, e))?;
        *received += chunk.len() as u64;
        reporter.report(
            id,
            TransferEvent::Progress {
                received: *received,
                total,
            },
        );
    }
    file.flush().await.map_err(|e| FetchError::io(dest, e))?;

    Ok(())
}

/// Best-effort removal of a partial download. Directories are never removed.
async fn remove_partial(dest: &Path) {
    match fs::remove_file(dest).await {
        Ok(()) => debug!(path = %dest.display(), "Removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "Failed to remove partial download"),
    }
}
