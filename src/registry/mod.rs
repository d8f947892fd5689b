//! The live object directory of one process.
//!
//! A [`Registry`] owns the bookkeeping for every registered entry (name,
//! event number, watches), an arena of the objects it owns, the event
//! counter, and the file monitor all watches go through. It is a plain
//! context object: create one per session and pass it to whatever needs it.

mod entry;

pub use entry::{LiveObject, Ownership, ReadOption, RegistrationState, RegistryEntry};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{RegistryConfig, WatchConfig};
use crate::error::{ErrorKind, ErrorRecord, LiveResult};
use crate::event::{EventCounter, EventNumber};
use crate::group::{self, ProcessGroup};
use crate::watch::{FileMonitor, ModificationChecking, WatchHandle};
use crate::{debug_event, log_event};

/// What registering an already used name does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Reject with a debug log line.
    Quiet,
    /// Reject with a warning; the prior entry stays.
    #[default]
    Warn,
    /// Fatal error listing the registry contents.
    Fatal,
}

pub struct Registry {
    scope: String,
    entries: IndexMap<String, RegistryEntry>,
    objects: IndexMap<String, Box<dyn LiveObject>>,
    counter: EventCounter,
    monitor: Box<dyn FileMonitor>,
    group: Arc<dyn ProcessGroup>,
    duplicates: DuplicatePolicy,
    default_name: String,
    checking: ModificationChecking,
    runtime_modifiable: bool,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("scope", &self.scope)
            .field("entries", &self.entries.len())
            .field("owned", &self.objects.len())
            .field("counter", &self.counter.peek())
            .field("checking", &self.checking)
            .finish()
    }
}

impl Registry {
    /// Empty registry with default policies.
    pub fn new(
        scope: impl Into<String>,
        monitor: Box<dyn FileMonitor>,
        group: Arc<dyn ProcessGroup>,
    ) -> Self {
        let registry = RegistryConfig::default();
        let watch = WatchConfig::default();
        Self {
            scope: scope.into(),
            entries: IndexMap::new(),
            objects: IndexMap::new(),
            counter: EventCounter::new(),
            monitor,
            group,
            duplicates: registry.duplicates,
            default_name: registry.default_name,
            checking: watch.checking,
            runtime_modifiable: watch.runtime_modifiable,
        }
    }

    /// Apply the `[registry]` and `[watch]` settings.
    pub fn configure(mut self, registry: &RegistryConfig, watch: &WatchConfig) -> Self {
        self.duplicates = registry.duplicates;
        self.default_name = registry.default_name.clone();
        self.checking = watch.checking;
        self.runtime_modifiable = watch.runtime_modifiable;
        self
    }

    pub fn with_duplicate_policy(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_counter(mut self, counter: EventCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_checking(mut self, checking: ModificationChecking) -> Self {
        self.checking = checking;
        self
    }

    pub fn with_runtime_modifiable(mut self, runtime_modifiable: bool) -> Self {
        self.runtime_modifiable = runtime_modifiable;
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn group(&self) -> &dyn ProcessGroup {
        self.group.as_ref()
    }

    pub fn checking(&self) -> ModificationChecking {
        self.checking
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Registered names, sorted.
    pub fn sorted_toc(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current counter value; the counter then advances by one.
    pub fn get_event(&mut self) -> EventNumber {
        self.counter.get_event()
    }

    /// Counter value the next [`get_event`](Self::get_event) returns.
    pub fn current_event(&self) -> EventNumber {
        self.counter.peek()
    }

    /// Unregistered entry stamped with a fresh event.
    pub fn new_entry(&mut self, name: impl Into<String>, type_tag: impl Into<String>) -> RegistryEntry {
        RegistryEntry::new(name, type_tag).with_event_number(self.get_event())
    }

    /// Register an externally owned entry.
    ///
    /// Returns false when the name is taken; the prior entry stays. Under
    /// [`DuplicatePolicy::Fatal`] the collision is an error instead, except
    /// for the default name which may always collide.
    #[track_caller]
    pub fn register(&mut self, mut entry: RegistryEntry) -> LiveResult<bool> {
        if self.entries.contains_key(entry.name()) {
            self.reject_duplicate(entry.name())?;
            return Ok(false);
        }

        entry.registration = RegistrationState::Registered;
        debug_event!("registry", "registered", "{} ({})", entry.name, entry.type_tag());
        self.entries.insert(entry.name.clone(), entry);
        Ok(true)
    }

    #[track_caller]
    fn reject_duplicate(&self, name: &str) -> LiveResult<()> {
        if name == self.default_name {
            return Ok(());
        }

        match self.duplicates {
            DuplicatePolicy::Quiet => {
                debug_event!("registry", "duplicate rejected", "{name}");
                Ok(())
            }
            DuplicatePolicy::Warn => {
                warn!(
                    "[registry] '{name}' is already registered in {}; keeping the existing entry",
                    self.scope
                );
                Ok(())
            }
            DuplicatePolicy::Fatal => Err(ErrorRecord::fatal(
                ErrorKind::DuplicateRegistration {
                    name: name.to_string(),
                },
                format!(
                    "Duplicate entry {name} in registry {}\nContents: {:?}",
                    self.scope,
                    self.sorted_toc()
                ),
            )
            .in_function("Registry::register")),
        }
    }

    /// Register `entry` and hand `object` to the registry, which drops it at
    /// teardown or on [`deregister`](Self::deregister).
    ///
    /// A rejected registration drops `object` immediately.
    #[track_caller]
    pub fn store(
        &mut self,
        mut entry: RegistryEntry,
        object: Box<dyn LiveObject>,
    ) -> LiveResult<bool> {
        entry.ownership = Ownership::OwnedByRegistry;
        let name = entry.name.clone();
        let registered = self.register(entry)?;
        if registered {
            self.objects.insert(name, object);
        }
        Ok(registered)
    }

    /// Remove `name`, releasing its watches newest first and dropping the
    /// object if the registry owns it. False when nothing was registered.
    pub fn deregister(&mut self, name: &str) -> bool {
        match self.take(name) {
            Some(_) => {
                debug_event!("registry", "deregistered", "{name}");
                true
            }
            None => false,
        }
    }

    /// Detach `name` with its owned object, if any. Watches are released.
    fn take(&mut self, name: &str) -> Option<(RegistryEntry, Option<Box<dyn LiveObject>>)> {
        let mut entry = self.entries.shift_remove(name)?;
        entry.watches.release_all(self.monitor.as_mut());
        entry.registration = RegistrationState::Unregistered;
        let object = self.objects.shift_remove(name);
        Some((entry, object))
    }

    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// Registry-owned object `name` as a `T`.
    pub fn object<T: LiveObject>(&self, name: &str) -> Option<&T> {
        self.objects.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn object_mut<T: LiveObject>(&mut self, name: &str) -> Option<&mut T> {
        self.objects.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    /// Move `old_name` to `new_name`.
    ///
    /// A taken `new_name` is handled like any other duplicate registration,
    /// and the entry stays registered under `old_name` with its object.
    /// Otherwise the entry leaves the registry and its watches are released;
    /// it comes back under the new name only when its `register_object` flag
    /// is set. Returns whether the entry is registered under `new_name`
    /// afterwards.
    #[track_caller]
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> LiveResult<bool> {
        let Some(entry) = self.entries.get(old_name) else {
            return Err(self.not_registered(old_name, "Registry::rename"));
        };
        if old_name == new_name {
            return Ok(true);
        }

        // A collision leaves the entry and its object where they are.
        let register_object = entry.register_object();
        if register_object && self.entries.contains_key(new_name) {
            self.reject_duplicate(new_name)?;
            return Ok(false);
        }

        let Some((mut entry, object)) = self.take(old_name) else {
            return Err(self.not_registered(old_name, "Registry::rename"));
        };
        entry.name = new_name.to_string();
        if !register_object {
            debug_event!("registry", "renamed out", "{old_name} -> {new_name}");
            return Ok(false);
        }

        let registered = match object {
            Some(object) => self.store(entry, object)?,
            None => self.register(entry)?,
        };
        if registered {
            debug_event!("registry", "renamed", "{old_name} -> {new_name}");
        }
        Ok(registered)
    }

    #[track_caller]
    fn not_registered(&self, name: &str, function: &str) -> ErrorRecord {
        ErrorRecord::fatal(
            ErrorKind::NotRegistered {
                name: name.to_string(),
            },
            format!("'{name}' is not registered in {}", self.scope),
        )
        .in_function(function)
    }

    #[track_caller]
    fn entry(&self, name: &str) -> LiveResult<&RegistryEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| self.not_registered(name, "Registry::entry"))
    }

    #[track_caller]
    fn entry_mut(&mut self, name: &str) -> LiveResult<&mut RegistryEntry> {
        if !self.entries.contains_key(name) {
            return Err(self.not_registered(name, "Registry::entry_mut"));
        }
        // Present, checked above.
        Ok(&mut self.entries[name])
    }

    #[track_caller]
    pub fn event_number(&self, name: &str) -> LiveResult<EventNumber> {
        Ok(self.entry(name)?.event_number())
    }

    /// Mark `name` fresh as of now. Returns its new event number.
    #[track_caller]
    pub fn set_up_to_date(&mut self, name: &str) -> LiveResult<EventNumber> {
        let event = self.counter.get_event();
        self.entry_mut(name)?.event_number = event;
        Ok(event)
    }

    /// True when `dependent` is fresh relative to every one of `producers`.
    #[track_caller]
    pub fn up_to_date(&self, dependent: &str, producers: &[&str]) -> LiveResult<bool> {
        let dependent = self.entry(dependent)?;
        let mut events = Vec::with_capacity(producers.len());
        for producer in producers {
            events.push(self.entry(producer)?.event_number());
        }
        Ok(dependent.event_number().up_to_date_all(events))
    }

    /// Watches are only kept for registered entries that re-read on change,
    /// and only when the run allows runtime modification.
    fn watches_enabled(&self, entry: &RegistryEntry) -> bool {
        entry.is_registered()
            && entry.read_option() == ReadOption::MustReadIfModified
            && self.runtime_modifiable
    }

    /// Watch an extra file `name` depends on.
    ///
    /// Returns the existing handle when `path` is already watched, and
    /// `None` when watches are disabled for the entry.
    #[track_caller]
    pub fn watch_dependency(&mut self, name: &str, path: &Path) -> LiveResult<Option<WatchHandle>> {
        let enabled = self.watches_enabled(self.entry(name)?);
        if !enabled {
            return Ok(None);
        }

        let entry = &mut self.entries[name];
        entry
            .watches
            .add_or_find(path, self.monitor.as_mut())
            .map(Some)
    }

    /// Watch `path` as the backing file of `name`.
    ///
    /// Watching a path the entry already watches is fatal. For a global entry
    /// in a coordinator checking mode, the coordinator's watch list replaces
    /// the dependency watches of every other process first, so that all ranks
    /// end up with the same set. That path is collective: every rank of a
    /// parallel run must make the call.
    #[track_caller]
    pub fn add_watch(&mut self, name: &str, path: &Path) -> LiveResult<Option<WatchHandle>> {
        let entry = self.entry(name)?;
        if !self.watches_enabled(entry) {
            return Ok(None);
        }

        if let Some(existing) = entry.watches().find(path) {
            return Err(ErrorRecord::fatal(
                ErrorKind::DuplicateWatch {
                    path: path.to_path_buf(),
                },
                format!(
                    "Object {name} of type {} already watched with handle {}",
                    entry.type_tag(),
                    existing.handle
                ),
            )
            .in_function("Registry::add_watch"));
        }

        let coordinator_only = entry.is_global() && self.checking.coordinator_only();
        if coordinator_only && self.group.is_parallel() {
            let paths = if self.group.is_coordinator() {
                entry.watches().paths()
            } else {
                Vec::new()
            };
            let paths: Vec<PathBuf> = group::broadcast_as(self.group.as_ref(), &paths)?;

            if !self.group.is_coordinator() {
                let entry = &mut self.entries[name];
                entry.watches.replace_with(&paths, self.monitor.as_mut())?;
            }
        }

        let entry = &mut self.entries[name];
        let handle = entry.watches.add(path, self.monitor.as_mut())?;
        debug_event!("registry", "watching", "{name}: {} {handle}", path.display());
        Ok(Some(handle))
    }

    /// [`add_watch`](Self::add_watch) on the entry's own backing file.
    /// Entries without one are not watched.
    #[track_caller]
    pub fn add_file_watch(&mut self, name: &str) -> LiveResult<Option<WatchHandle>> {
        match self.entry(name)?.file_path() {
            Some(path) => {
                let path = path.to_path_buf();
                self.add_watch(name, &path)
            }
            None => Ok(None),
        }
    }

    /// Release one watch of `name`. False when the handle is not its own.
    #[track_caller]
    pub fn remove_watch(&mut self, name: &str, handle: WatchHandle) -> LiveResult<bool> {
        self.entry(name)?;
        let entry = &mut self.entries[name];
        Ok(entry.watches.remove(handle, self.monitor.as_mut()))
    }

    /// Fingerprint of `path` as the monitor sees it, watched or not.
    pub fn probe(&self, path: &Path) -> crate::watch::FileState {
        self.monitor.probe(path)
    }

    /// Entries with a watched file that changed since it was last checked.
    /// Nothing is recorded.
    pub fn modified_entries(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| {
                entry
                    .watches()
                    .iter()
                    .any(|w| self.monitor.current_state(w.handle) != w.last_known)
            })
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// True when any watched file changed.
    pub fn modified(&self) -> bool {
        !self.modified_entries().is_empty()
    }

    /// Accept every file change and give each changed entry a fresh event
    /// number, which makes its dependents stale. Returns the changed names.
    ///
    /// In a coordinator checking mode only the coordinator inspects the files
    /// of global entries; the resulting names are broadcast and every rank
    /// must call this together. Other entries are checked on every rank.
    pub fn refresh_modified(&mut self) -> LiveResult<Vec<String>> {
        let coordinated = self.checking.coordinator_only() && self.group.is_parallel();

        let mut changed = if coordinated {
            let local = if self.group.is_coordinator() {
                self.collect_changes(RegistryEntry::is_global)
            } else {
                Vec::new()
            };
            let changed: Vec<String> = group::broadcast_as(self.group.as_ref(), &local)?;
            if !self.group.is_coordinator() {
                for entry in self.entries.values_mut().filter(|e| e.is_global()) {
                    entry.watches.sync_states(self.monitor.as_ref());
                }
            }
            changed
        } else {
            Vec::new()
        };
        changed.extend(self.collect_changes(|entry| !coordinated || !entry.is_global()));

        for name in &changed {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.event_number = self.counter.get_event();
                log_event!("registry", "modified", "{name} now at event {}", entry.event_number);
            }
        }
        Ok(changed)
    }

    /// Accept the file changes of the entries selected by `filter`.
    fn collect_changes(&mut self, filter: impl Fn(&RegistryEntry) -> bool) -> Vec<String> {
        let monitor = self.monitor.as_ref();
        self.entries
            .values_mut()
            .filter(|entry| filter(entry))
            .filter_map(|entry| entry.watches.changed(monitor).then(|| entry.name.clone()))
            .collect()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Newest entries first, and each entry's watches newest first.
        while let Some((_, mut entry)) = self.entries.pop() {
            entry.watches.release_all(self.monitor.as_mut());
        }
        while self.objects.pop().is_some() {}
    }
}
