//! One named, live object as the registry sees it.

use std::any::Any;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dict::{FromNode, Node};
use crate::event::EventNumber;
use crate::watch::WatchSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// Who destroys the object behind an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    /// The caller owns the object and deregisters it when done.
    OwnedExternally,
    /// The registry keeps the object and drops it at teardown.
    OwnedByRegistry,
}

/// Read policy of an entry's backing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadOption {
    #[default]
    NoRead,
    MustRead,
    /// Read once and re-read whenever the file changes.
    #[serde(rename = "if-modified")]
    MustReadIfModified,
    #[serde(rename = "if-present")]
    ReadIfPresent,
}

impl FromNode for ReadOption {
    fn from_node(node: &Node) -> Result<Self, String> {
        match String::from_node(node)?.as_str() {
            "no-read" => Ok(Self::NoRead),
            "must-read" => Ok(Self::MustRead),
            "if-modified" => Ok(Self::MustReadIfModified),
            "if-present" => Ok(Self::ReadIfPresent),
            other => Err(format!(
                "unknown read option '{other}', expected one of no-read, must-read, if-modified, if-present"
            )),
        }
    }
}

/// Object that can be stored in a registry.
pub trait LiveObject: Any {
    fn type_tag(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Registry bookkeeping for one object.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub(crate) name: String,
    type_tag: String,
    pub(crate) event_number: EventNumber,
    pub(crate) registration: RegistrationState,
    pub(crate) ownership: Ownership,
    read_option: ReadOption,
    register_object: bool,
    global: bool,
    file_path: Option<PathBuf>,
    pub(crate) watches: WatchSet,
}

impl RegistryEntry {
    /// Unregistered, externally owned entry stamped with event zero.
    ///
    /// Use [`Registry::new_entry`](super::Registry::new_entry) for an entry
    /// stamped with a fresh event.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            event_number: EventNumber::ZERO,
            registration: RegistrationState::Unregistered,
            ownership: Ownership::OwnedExternally,
            read_option: ReadOption::NoRead,
            register_object: true,
            global: false,
            file_path: None,
            watches: WatchSet::new(),
        }
    }

    pub fn with_read_option(mut self, read_option: ReadOption) -> Self {
        self.read_option = read_option;
        self
    }

    /// Backing file watched by [`Registry::add_file_watch`](super::Registry::add_file_watch).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Whether [`Registry::rename`](super::Registry::rename) registers the
    /// entry again under its new name.
    pub fn with_register_object(mut self, register_object: bool) -> Self {
        self.register_object = register_object;
        self
    }

    /// The same file is read on every process of the group.
    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn with_event_number(mut self, event_number: EventNumber) -> Self {
        self.event_number = event_number;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn event_number(&self) -> EventNumber {
        self.event_number
    }

    pub fn registration(&self) -> RegistrationState {
        self.registration
    }

    pub fn is_registered(&self) -> bool {
        self.registration == RegistrationState::Registered
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn read_option(&self) -> ReadOption {
        self.read_option
    }

    pub fn register_object(&self) -> bool {
        self.register_object
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn watches(&self) -> &WatchSet {
        &self.watches
    }

    /// Fresh relative to `producer`.
    pub fn up_to_date(&self, producer: &RegistryEntry) -> bool {
        self.event_number.up_to_date(producer.event_number)
    }

    /// Fresh relative to every producer.
    pub fn up_to_date_all<'a>(&self, producers: impl IntoIterator<Item = &'a RegistryEntry>) -> bool {
        self.event_number
            .up_to_date_all(producers.into_iter().map(|p| p.event_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry = RegistryEntry::new("U", "volVectorField");
        assert_eq!(entry.name(), "U");
        assert_eq!(entry.type_tag(), "volVectorField");
        assert!(!entry.is_registered());
        assert_eq!(entry.ownership(), Ownership::OwnedExternally);
        assert_eq!(entry.read_option(), ReadOption::NoRead);
        assert!(entry.register_object());
        assert!(entry.watches().is_empty());
    }

    #[test]
    fn test_up_to_date_between_entries() {
        let producer = RegistryEntry::new("p", "t").with_event_number(EventNumber::new(5));
        let fresh = RegistryEntry::new("d", "t").with_event_number(EventNumber::new(6));
        let stale = RegistryEntry::new("e", "t").with_event_number(EventNumber::new(4));

        assert!(fresh.up_to_date(&producer));
        assert!(!stale.up_to_date(&producer));
        assert!(fresh.up_to_date_all([&producer, &stale]));
    }

    #[test]
    fn test_read_option_from_node() {
        assert_eq!(
            ReadOption::from_node(&Node::from("if-modified")).unwrap(),
            ReadOption::MustReadIfModified
        );
        assert!(ReadOption::from_node(&Node::from("sometimes")).is_err());
        assert!(ReadOption::from_node(&Node::from(3i64)).is_err());
    }
}
