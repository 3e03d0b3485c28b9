// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fetch & unpack engine for pipcook artifacts.
//!
//! This module retrieves an artifact into a target directory:
//! - `file:` sources are extracted (`.zip`) or copied
//! - `http:`/`https:` sources are streamed to disk with progress events
//! - remote zips go through a uniquely named scratch file that is removed
//!   after extraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ FetchEngine     │────▶│ transfer        │──▶ ProgressReporter
//! │   acquire()     │     │ (reqwest stream)│
//! └────────┬────────┘     └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ extract         │
//! │ (zip, blocking) │
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use pipcook::fetch::FetchEngine;
//!
//! # async fn example() -> Result<(), pipcook::fetch::FetchError> {
//! let engine = FetchEngine::new("/tmp/pipcook-scratch");
//! engine
//!     .acquire("https://example.com/framework.zip", "/opt/frameworks/tfjs".as_ref())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod extract;
pub mod progress;
pub mod transfer;

// Re-export commonly used items
pub use engine::{classify, AcquireStage, FetchEngine, Source};
pub use error::{ExtractError, FetchError};
pub use extract::{extract_zip, is_zip};
pub use progress::{
    progress_channel, BarReporter, ChannelReporter, NoProgress, ProgressReporter, TransferEvent,
    TransferId, TransferUpdate,
};
