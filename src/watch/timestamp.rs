//! Polling monitor based on file metadata.

use std::path::Path;

use super::slots::HandleSlots;
use super::{FileMonitor, FileState, WatchHandle};
use crate::error::LiveResult;

/// Detects modification by comparing modification time and length.
///
/// Every [`current_state`](FileMonitor::current_state) call stats the file.
#[derive(Debug, Default)]
pub struct TimestampMonitor {
    slots: HandleSlots,
}

impl TimestampMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live watches.
    pub fn live_count(&self) -> usize {
        self.slots.live_count()
    }
}

impl FileMonitor for TimestampMonitor {
    fn probe(&self, path: &Path) -> FileState {
        match std::fs::metadata(path) {
            Ok(meta) => FileState::Stamp {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
            Err(_) => FileState::Missing,
        }
    }

    fn begin_watch(&mut self, path: &Path) -> LiveResult<WatchHandle> {
        let handle = self.slots.insert(path.to_path_buf());
        tracing::trace!("[watch] timestamp watch {handle} on {}", path.display());
        Ok(handle)
    }

    fn end_watch(&mut self, handle: WatchHandle) -> bool {
        self.slots.remove(handle).is_some()
    }

    fn current_state(&self, handle: WatchHandle) -> FileState {
        match self.watched_path(handle) {
            Some(path) => self.probe(path),
            None => FileState::Missing,
        }
    }

    fn watched_path(&self, handle: WatchHandle) -> Option<&Path> {
        self.slots.get(handle)
    }
}
