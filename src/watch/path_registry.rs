//! Watched paths and the directories that must be subscribed to see them.
//!
//! Change notifications are taken from parent directories, since editors
//! often replace a file instead of writing it in place.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Reference-counted watched files plus their subscribed directories.
#[derive(Debug, Default)]
pub struct PathRegistry {
    /// File -> number of live watches on it.
    paths: HashMap<PathBuf, usize>,
    /// Subscribed directories (parents of watched files).
    watch_dirs: HashSet<PathBuf>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track one more watch on `path`.
    ///
    /// Returns the parent directory when it was not subscribed before.
    pub fn add_path(&mut self, path: &Path) -> Option<PathBuf> {
        *self.paths.entry(path.to_path_buf()).or_insert(0) += 1;

        let parent = Self::watch_dir_of(path);
        self.watch_dirs
            .insert(parent.clone())
            .then_some(parent)
    }

    /// Drop one watch on `path`. Returns true when no watch remains on it.
    ///
    /// Directories stay subscribed even when empty, as other watches may
    /// land there again.
    pub fn remove_path(&mut self, path: &Path) -> bool {
        match self.paths.get_mut(path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.paths.remove(path);
                true
            }
            None => false,
        }
    }

    /// Forget that `dir` is subscribed, so the next path under it reports
    /// it again from [`add_path`](Self::add_path).
    pub fn unsubscribe(&mut self, dir: &Path) -> bool {
        self.watch_dirs.remove(dir)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.keys().map(PathBuf::as_path)
    }

    pub fn watch_dirs(&self) -> &HashSet<PathBuf> {
        &self.watch_dirs
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn dir_count(&self) -> usize {
        self.watch_dirs.len()
    }

    /// Directory to subscribe to for `path`; `.` for bare file names.
    pub fn watch_dir_of(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_registry_basic() {
        let mut registry = PathRegistry::new();

        assert_eq!(
            registry.add_path(Path::new("/case/constant/a")),
            Some(PathBuf::from("/case/constant"))
        );
        assert_eq!(registry.add_path(Path::new("/case/constant/b")), None);
        assert_eq!(
            registry.add_path(Path::new("/case/system/c")),
            Some(PathBuf::from("/case/system"))
        );

        assert_eq!(registry.path_count(), 3);
        assert_eq!(registry.dir_count(), 2);
        assert!(registry.contains(Path::new("/case/constant/a")));
    }

    #[test]
    fn test_path_registry_refcount() {
        let mut registry = PathRegistry::new();
        let path = Path::new("/case/system/controlDict");

        registry.add_path(path);
        registry.add_path(path);
        assert_eq!(registry.path_count(), 1);

        assert!(!registry.remove_path(path));
        assert!(registry.contains(path));
        assert!(registry.remove_path(path));
        assert!(!registry.contains(path));

        // Directory stays subscribed.
        assert_eq!(registry.dir_count(), 1);
    }

    #[test]
    fn test_unsubscribed_dir_is_reported_again() {
        let mut registry = PathRegistry::new();
        let dir = registry.add_path(Path::new("/case/later/a")).unwrap();

        assert!(registry.unsubscribe(&dir));
        assert_eq!(registry.add_path(Path::new("/case/later/b")), Some(dir));
        assert!(registry.contains(Path::new("/case/later/a")));
    }

    #[test]
    fn test_path_registry_root_files() {
        let mut registry = PathRegistry::new();
        assert_eq!(
            registry.add_path(Path::new("settings.toml")),
            Some(PathBuf::from("."))
        );
    }
}
