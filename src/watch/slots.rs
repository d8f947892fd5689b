//! Handle table shared by the monitors.

use std::path::{Path, PathBuf};

use super::WatchHandle;

/// Watched path per issued handle. Released slots are handed out again, so
/// the table never holds more slots than the peak number of live watches.
#[derive(Debug, Default)]
pub(crate) struct HandleSlots {
    slots: Vec<Option<PathBuf>>,
    free: Vec<usize>,
}

impl HandleSlots {
    pub(crate) fn insert(&mut self, path: PathBuf) -> WatchHandle {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(path);
                WatchHandle::new(index)
            }
            None => {
                self.slots.push(Some(path));
                WatchHandle::new(self.slots.len() - 1)
            }
        }
    }

    /// Release `handle`; `None` when it was not live.
    pub(crate) fn remove(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let path = self.slots.get_mut(handle.index())?.take()?;
        self.free.push(handle.index());
        Some(path)
    }

    pub(crate) fn get(&self, handle: WatchHandle) -> Option<&Path> {
        self.slots.get(handle.index()).and_then(|slot| slot.as_deref())
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_slots_are_reused() {
        let mut slots = HandleSlots::default();
        let a = slots.insert(PathBuf::from("/a"));
        let b = slots.insert(PathBuf::from("/b"));

        assert_eq!(slots.remove(a), Some(PathBuf::from("/a")));
        assert_eq!(slots.remove(a), None);
        assert_eq!(slots.get(a), None);

        let c = slots.insert(PathBuf::from("/c"));
        assert_eq!(c, a);
        assert_eq!(slots.get(c), Some(Path::new("/c")));
        assert_eq!(slots.get(b), Some(Path::new("/b")));
        assert_eq!(slots.live_count(), 2);
    }

    #[test]
    fn test_capacity_bounded_by_peak_live_watches() {
        let mut slots = HandleSlots::default();
        for round in 0..50 {
            let handles: Vec<_> = (0..3)
                .map(|i| slots.insert(PathBuf::from(format!("/r{round}/{i}"))))
                .collect();
            for handle in handles.into_iter().rev() {
                slots.remove(handle);
            }
        }
        assert_eq!(slots.capacity(), 3);
        assert_eq!(slots.live_count(), 0);
    }
}
