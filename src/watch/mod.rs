//! File watching for `kiln build --watch` and `kiln serve`.
//!
//! ```text
//! notify ──▶ bounded channel (64) ──▶ Debouncer ──▶ Vec<ChangeEvent> ──▶ rebuild
//! ```
//!
//! The notify callback blocks when the channel is full, so a burst of events
//! slows the producer instead of growing memory. The watcher starts before
//! the initial build and buffers every event that happens meanwhile.

mod debouncer;
mod types;


use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::core::CancelToken;
use debouncer::Debouncer;

pub use types::{ChangeEvent, ChangeKind};

const CHANNEL_CAPACITY: usize = 64;

/// Longest wait between cancellation checks.
const POLL_LIMIT: Duration = Duration::from_millis(250);

pub struct Watcher {
    /// Must be kept alive for events to arrive.
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Event>,
    debouncer: Debouncer,
}

impl Watcher {
    /// Watch `root` recursively. Events under `ignored` directories are
    /// dropped.
    pub fn new(root: &Path, ignored: Vec<PathBuf>) -> notify::Result<Self> {
        let (tx, rx) = channel::bounded(CHANNEL_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => crate::log!("watch"; "notify error: {}", e),
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        crate::debug!("watch"; "watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            debouncer: Debouncer::new(ignored),
        })
    }

    /// Block until a debounced batch of changes is ready.
    ///
    /// Returns `None` once `cancel` fires or the watcher stops.
    pub fn next_batch(&mut self, cancel: &CancelToken) -> Option<Vec<ChangeEvent>> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.rx.recv_timeout(self.debouncer.sleep_duration().min(POLL_LIMIT)) {
                Ok(event) => self.debouncer.add_event(&event),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(batch) = self.debouncer.take_if_ready() {
                        return Some(batch);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
