//! File watches on the backing files of registry entries.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   - one Box<dyn FileMonitor> (timestamp polling or notify)
//!   - per entry: WatchSet [ (path, last known state, handle), ... ]
//!         |
//!   refresh_modified(): compare current_state(handle) with last known
//! ```
//!
//! Handles are released in reverse acquisition order; some backends require
//! it.

mod inotify;
mod path_registry;
mod set;
mod slots;
mod timestamp;

pub use inotify::InotifyMonitor;
pub use path_registry::PathRegistry;
pub use set::{WatchEntry, WatchSet};
pub use timestamp::TimestampMonitor;

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::LiveResult;

/// Handle issued by a [`FileMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchHandle(usize);

impl WatchHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Change fingerprint of a file, as defined by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Missing,
    Stamp {
        modified: Option<SystemTime>,
        len: u64,
    },
    Generation(u64),
}

/// Filesystem collaborator.
pub trait FileMonitor: Send {
    /// Fingerprint of `path` right now, watched or not.
    fn probe(&self, path: &Path) -> FileState;

    fn begin_watch(&mut self, path: &Path) -> LiveResult<WatchHandle>;

    /// Stop watching; false when the handle was not live.
    fn end_watch(&mut self, handle: WatchHandle) -> bool;

    fn current_state(&self, handle: WatchHandle) -> FileState;

    fn watched_path(&self, handle: WatchHandle) -> Option<&Path>;
}

/// How file modification is detected, and by whom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModificationChecking {
    /// Every process polls modification times.
    #[default]
    Timestamp,
    /// Only the coordinator polls; results are broadcast.
    TimestampCoordinator,
    /// Every process listens for change notifications.
    Inotify,
    /// Only the coordinator listens; results are broadcast.
    InotifyCoordinator,
}

impl ModificationChecking {
    pub fn coordinator_only(self) -> bool {
        matches!(self, Self::TimestampCoordinator | Self::InotifyCoordinator)
    }

    /// Monitor implementing this mode.
    pub fn monitor(self) -> LiveResult<Box<dyn FileMonitor>> {
        Ok(match self {
            Self::Timestamp | Self::TimestampCoordinator => Box::new(TimestampMonitor::new()),
            Self::Inotify | Self::InotifyCoordinator => Box::new(InotifyMonitor::new()?),
        })
    }
}

impl fmt::Display for ModificationChecking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timestamp => "timestamp",
            Self::TimestampCoordinator => "timestamp-coordinator",
            Self::Inotify => "inotify",
            Self::InotifyCoordinator => "inotify-coordinator",
        };
        f.write_str(name)
    }
}
