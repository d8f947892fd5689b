//! Notification-driven monitor on top of `notify`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::path_registry::PathRegistry;
use super::slots::HandleSlots;
use super::{FileMonitor, FileState, WatchHandle};
use crate::error::{ErrorKind, ErrorRecord, LiveResult};

/// Change counters per watched absolute path, bumped from the notify thread.
type Generations = Arc<Mutex<HashMap<PathBuf, u64>>>;

/// Count one change for every watched path in `paths`. Other files in a
/// subscribed directory are ignored.
fn record_changes(generations: &Mutex<HashMap<PathBuf, u64>>, paths: &[PathBuf]) {
    let mut generations = generations.lock();
    for path in paths {
        if let Some(generation) = generations.get_mut(path) {
            *generation += 1;
        }
    }
}

/// Counts change notifications per file; the count is the fingerprint.
///
/// Parent directories are subscribed non-recursively, once each. A directory
/// that cannot be subscribed yet is tried again by the next watch under it.
pub struct InotifyMonitor {
    watcher: notify::RecommendedWatcher,
    registry: PathRegistry,
    slots: HandleSlots,
    generations: Generations,
}

impl std::fmt::Debug for InotifyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifyMonitor")
            .field("paths", &self.registry.path_count())
            .field("dirs", &self.registry.dir_count())
            .finish()
    }
}

impl InotifyMonitor {
    pub fn new() -> LiveResult<Self> {
        let generations: Generations = Arc::default();
        let sink = generations.clone();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    record_changes(&sink, &event.paths);
                }
            }
            Err(e) => tracing::error!("[watch] file watch error: {e}"),
        })
        .map_err(|e| {
            ErrorRecord::fatal(
                ErrorKind::WatchFailed {
                    path: PathBuf::from("."),
                },
                format!("failed to initialize notify watcher: {e}"),
            )
            .in_function("InotifyMonitor::new")
        })?;

        Ok(Self {
            watcher,
            registry: PathRegistry::new(),
            slots: HandleSlots::default(),
            generations,
        })
    }

    fn absolute(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn generation(&self, path: &Path) -> u64 {
        self.generations.lock().get(path).copied().unwrap_or(0)
    }

    /// Number of directories with a live subscription.
    pub fn subscribed_dirs(&self) -> usize {
        self.registry.dir_count()
    }
}

impl FileMonitor for InotifyMonitor {
    fn probe(&self, path: &Path) -> FileState {
        FileState::Generation(self.generation(&Self::absolute(path)))
    }

    fn begin_watch(&mut self, path: &Path) -> LiveResult<WatchHandle> {
        let path = Self::absolute(path);

        if let Some(dir) = self.registry.add_path(&path) {
            match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => crate::debug_event!("watch", "subscribed", "{}", dir.display()),
                Err(e) => {
                    // Keep the handle; the next watch under `dir` subscribes again.
                    self.registry.unsubscribe(&dir);
                    tracing::warn!("[watch] failed to watch {}: {e}", dir.display());
                }
            }
        }

        self.generations.lock().entry(path.clone()).or_insert(0);
        Ok(self.slots.insert(path))
    }

    fn end_watch(&mut self, handle: WatchHandle) -> bool {
        match self.slots.remove(handle) {
            Some(path) => {
                if self.registry.remove_path(&path) {
                    self.generations.lock().remove(&path);
                }
                true
            }
            None => false,
        }
    }

    fn current_state(&self, handle: WatchHandle) -> FileState {
        match self.watched_path(handle) {
            Some(path) => FileState::Generation(self.generation(path)),
            None => FileState::Missing,
        }
    }

    fn watched_path(&self, handle: WatchHandle) -> Option<&Path> {
        self.slots.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_released_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("value.txt");
        std::fs::write(&path, "1").unwrap();

        let mut monitor = InotifyMonitor::new().unwrap();
        let handle = monitor.begin_watch(&path).unwrap();

        assert_eq!(monitor.current_state(handle), FileState::Generation(0));
        assert!(monitor.end_watch(handle));
        assert!(!monitor.end_watch(handle));
        assert_eq!(monitor.current_state(handle), FileState::Missing);
    }

    #[test]
    fn test_missing_directory_is_subscribed_once_it_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let later = dir.path().join("later");

        let mut monitor = InotifyMonitor::new().unwrap();
        monitor.begin_watch(&later.join("a.txt")).unwrap();
        assert_eq!(monitor.subscribed_dirs(), 0);

        std::fs::create_dir(&later).unwrap();
        monitor.begin_watch(&later.join("b.txt")).unwrap();
        assert_eq!(monitor.subscribed_dirs(), 1);
    }

    #[test]
    fn test_only_watched_paths_are_counted() {
        let generations = Mutex::new(HashMap::from([(PathBuf::from("/case/a"), 0)]));
        record_changes(
            &generations,
            &[PathBuf::from("/case/a"), PathBuf::from("/case/scratch")],
        );

        let generations = generations.lock();
        assert_eq!(generations.get(Path::new("/case/a")), Some(&1));
        assert!(!generations.contains_key(Path::new("/case/scratch")));
    }

    #[test]
    fn test_released_path_stops_counting() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("value.txt");

        let mut monitor = InotifyMonitor::new().unwrap();
        let handle = monitor.begin_watch(&path).unwrap();
        monitor.end_watch(handle);

        let absolute = InotifyMonitor::absolute(&path);
        assert!(!monitor.generations.lock().contains_key(&absolute));
    }

    #[test]
    fn test_generation_starts_at_zero_for_unknown_paths() {
        let monitor = InotifyMonitor::new().unwrap();
        assert_eq!(
            monitor.probe(Path::new("/definitely/not/here")),
            FileState::Generation(0)
        );
    }
}
