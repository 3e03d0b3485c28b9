// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-count progress events emitted by downloads.
//!
//! The transfer code only emits [`TransferEvent`]s to a [`ProgressReporter`],
//! tagged with the [`TransferId`] of the download they belong to so that
//! concurrent downloads on one engine can be told apart. Rendering is a
//! separate concern: [`BarReporter`] draws one `indicatif` bar per download,
//! [`ChannelReporter`] turns the events into a `Stream` for any other
//! subscriber, and [`NoProgress`] drops them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Identifies one download within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    /// A fresh id, distinct from every other id handed out in this process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step of a single download.
///
/// A download that gets a successful response emits `Started`, any number of
/// `Progress`, then exactly one of `Finished` or `Failed`. A download that
/// fails before a response arrives (connection error, non-2xx status) emits
/// only `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Response received; `total` comes from `content-length` when present
    Started { total: Option<u64> },
    /// A chunk was written
    Progress { received: u64, total: Option<u64> },
    /// All bytes written
    Finished { received: u64 },
    /// The transfer aborted after `received` bytes
    Failed { received: u64 },
}

impl TransferEvent {
    /// Returns true for `Finished` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }

    /// Get progress percentage (0-100) if the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Started { .. } => Some(0.0),
            Self::Progress {
                received,
                total: Some(total),
            } => Some(if *total == 0 {
                100.0
            } else {
                (*received as f64 / *total as f64) * 100.0
            }),
            Self::Progress { total: None, .. } => None,
            Self::Finished { .. } => Some(100.0),
            Self::Failed { .. } => None,
        }
    }
}

/// An event together with the download it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUpdate {
    pub id: TransferId,
    pub event: TransferEvent,
}

/// Receives progress events for downloads.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, id: TransferId, event: TransferEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _id: TransferId, _event: TransferEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<TransferUpdate>,
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, id: TransferId, event: TransferEvent) {
        // A dropped subscriber must not affect the transfer.
        let _ = self.tx.send(TransferUpdate { id, event });
    }
}

/// Create a reporter and the update stream it feeds.
///
/// The stream ends once every clone of the reporter has been dropped.
pub fn progress_channel() -> (ChannelReporter, UnboundedReceiverStream<TransferUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelReporter { tx }, UnboundedReceiverStream::new(rx))
}

/// Renders one byte progress line per active download on stderr.
///
/// `indicatif` hides the bars when stderr is not a terminal, so this is safe
/// to use unconditionally.
#[derive(Default)]
pub struct BarReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<TransferId, ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar_for(total: Option<u64>) -> ProgressBar {
        match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("  {spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes}")
                {
                    bar.set_style(style.progress_chars("█▓░"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {bytes}")
                {
                    bar.set_style(style);
                }
                bar
            }
        }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, id: TransferId, event: TransferEvent) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            TransferEvent::Started { total } => {
                let bar = self.multi.add(Self::bar_for(total));
                if let Some(stale) = bars.insert(id, bar) {
                    stale.finish_and_clear();
                }
            }
            TransferEvent::Progress { received, .. } => {
                if let Some(bar) = bars.get(&id) {
                    bar.set_position(received);
                }
            }
            TransferEvent::Finished { .. } | TransferEvent::Failed { .. } => {
                if let Some(bar) = bars.remove(&id) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
            }
        }
    }
}
