// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Zip extraction.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::error::ExtractError;

/// Extension that marks a source as a zip archive.
pub const ZIP_EXTENSION: &str = "zip";

/// Returns true if `file_name` ends with `.zip` (case-sensitive).
pub fn is_zip(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext == ZIP_EXTENSION)
}

/// Unpack the zip at `archive` into `target`, creating `target` if absent.
///
/// Entries keep their relative paths, symlinks and, on unix, their modes.
/// Directory modes are applied after every entry is written. An entry whose
/// name would escape `target` (absolute path, `..`) fails the whole
/// extraction. Returns the number of entries in the archive.
///
/// Blocking; call it from `spawn_blocking` in async code.
pub fn extract_zip(archive: &Path, target: &Path) -> Result<usize, ExtractError> {
    fs::create_dir_all(target).map_err(|source| ExtractError::Io {
        path: target.to_path_buf(),
        source,
    })?;

    let file = File::open(archive).map_err(|source| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|source| {
        ExtractError::InvalidZip {
            path: archive.to_path_buf(),
            source,
        }
    })?;

    let entries = zip.len();
    debug!(archive = %archive.display(), target = %target.display(), entries, "Extracting zip");

    zip.extract(target).map_err(|err| match err {
        ZipError::Io(source) => ExtractError::Io {
            path: target.to_path_buf(),
            source,
        },
        source => ExtractError::InvalidZip {
            path: archive.to_path_buf(),
            source,
        },
    })?;

    Ok(entries)
}
