use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::types::{ChangeEvent, ChangeKind};
use crate::utils::path::normalize_path;

pub(super) const DEBOUNCE_MS: u64 = 200;
pub(super) const REBUILD_COOLDOWN_MS: u64 = 500;

/// Timing and deduplication of raw notify events.
pub(super) struct Debouncer {
    /// Path → ChangeKind (dedup is free via HashMap key uniqueness)
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    /// Directories whose events are dropped (output and cache).
    ignored: Vec<PathBuf>,
    pub(super) last_event: Option<Instant>,
    pub(super) last_batch: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(ignored: Vec<PathBuf>) -> Self {
        Self {
            changes: FxHashMap::default(),
            ignored,
            last_event: None,
            last_batch: None,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Removed + Created/Modified → the new kind (file was restored)
    /// - Modified + Removed → Removed
    /// - Created + Removed → dropped
    /// - otherwise the first event wins
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime, chmod) would rebuild in a loop
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);
            if self.ignored.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }

            match self.changes.get(&path).copied() {
                None => {
                    crate::debug!("watch"; "{}: {}", kind.label(), path.display());
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Removed) if kind != ChangeKind::Removed => {
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Modified) if kind == ChangeKind::Removed => {
                    self.changes.insert(path, ChangeKind::Removed);
                }
                Some(ChangeKind::Created) if kind == ChangeKind::Removed => {
                    self.changes.remove(&path);
                }
                Some(_) => continue,
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the pending changes once debounce and cooldown have elapsed,
    /// sorted by path.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<ChangeEvent>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        self.last_batch = Some(Instant::now());

        let mut events: Vec<ChangeEvent> = self
            .changes
            .drain()
            .map(|(path, kind)| ChangeEvent::new(path, kind))
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        Some(events)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }
        if let Some(last_batch) = self.last_batch
            && last_batch.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS)
        {
            return false;
        }
        !self.changes.is_empty()
    }

    /// Time until the next batch could become ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_batch
            .map(|t| Duration::from_millis(REBUILD_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Editor artifacts: backups, swap files, dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
