//! The ordered set of watches held by one entry.

use std::path::{Path, PathBuf};

use super::{FileMonitor, FileState, WatchHandle};
use crate::error::{ErrorKind, ErrorRecord, LiveResult};

/// One watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub path: PathBuf,
    pub last_known: FileState,
    pub handle: WatchHandle,
}

/// Watches of one entry in acquisition order, deduplicated by path.
///
/// Sets are small, so lookups are linear scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    entries: Vec<WatchEntry>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.iter()
    }

    pub fn find(&self, path: &Path) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    pub fn handles(&self) -> Vec<WatchHandle> {
        self.entries.iter().map(|e| e.handle).collect()
    }

    /// Start watching `path`. Watching the same path twice is a caller bug.
    #[track_caller]
    pub fn add(&mut self, path: &Path, monitor: &mut dyn FileMonitor) -> LiveResult<WatchHandle> {
        if let Some(existing) = self.find(path) {
            return Err(ErrorRecord::fatal(
                ErrorKind::DuplicateWatch {
                    path: path.to_path_buf(),
                },
                format!(
                    "{} already watched with handle {}",
                    path.display(),
                    existing.handle
                ),
            )
            .in_function("WatchSet::add"));
        }
        self.push(path, monitor)
    }

    /// Start watching `path` unless it is already watched; returns the handle
    /// either way.
    pub fn add_or_find(
        &mut self,
        path: &Path,
        monitor: &mut dyn FileMonitor,
    ) -> LiveResult<WatchHandle> {
        match self.find(path) {
            Some(existing) => Ok(existing.handle),
            None => self.push(path, monitor),
        }
    }

    fn push(&mut self, path: &Path, monitor: &mut dyn FileMonitor) -> LiveResult<WatchHandle> {
        let handle = monitor.begin_watch(path)?;
        let last_known = monitor.current_state(handle);
        self.entries.push(WatchEntry {
            path: path.to_path_buf(),
            last_known,
            handle,
        });
        Ok(handle)
    }

    /// Release one watch. False when the handle is not in this set.
    pub fn remove(&mut self, handle: WatchHandle, monitor: &mut dyn FileMonitor) -> bool {
        match self.entries.iter().position(|e| e.handle == handle) {
            Some(pos) => {
                let entry = self.entries.remove(pos);
                monitor.end_watch(entry.handle);
                true
            }
            None => false,
        }
    }

    /// Release every watch, newest first.
    pub fn release_all(&mut self, monitor: &mut dyn FileMonitor) {
        while let Some(entry) = self.entries.pop() {
            monitor.end_watch(entry.handle);
        }
    }

    /// Replace the whole set with watches on `paths`, in order.
    pub fn replace_with(
        &mut self,
        paths: &[PathBuf],
        monitor: &mut dyn FileMonitor,
    ) -> LiveResult<()> {
        self.release_all(monitor);
        for path in paths {
            self.add_or_find(path, monitor)?;
        }
        Ok(())
    }

    /// True when any watched file changed since the last check. Records the
    /// new states.
    pub fn changed(&mut self, monitor: &dyn FileMonitor) -> bool {
        let mut changed = false;
        for entry in &mut self.entries {
            let state = monitor.current_state(entry.handle);
            if state != entry.last_known {
                crate::debug_event!("watch", "changed", "{}", entry.path.display());
                entry.last_known = state;
                changed = true;
            }
        }
        changed
    }

    /// Accept the current states without reporting a change.
    pub fn sync_states(&mut self, monitor: &dyn FileMonitor) {
        for entry in &mut self.entries {
            entry.last_known = monitor.current_state(entry.handle);
        }
    }
}
