//! Live object directory: a per-process registry of named objects with
//! event-number staleness tracking, file watches on backing files, runtime
//! implementation selection by string key, and structured fatal-error
//! handling that stays safe across a group of cooperating processes.

pub mod case;
pub mod cli;
pub mod config;
pub mod dict;
pub mod error;
pub mod event;
pub mod factory;
pub mod group;
pub mod logging;
pub mod registry;
pub mod session;
pub mod watch;

pub use config::Settings;
pub use dict::{Dictionary, FromNode, Node};
pub use error::{
    AbortPolicy, Disposition, ErrorKind, ErrorRecord, FatalMode, LiveResult, Severity,
};
pub use event::{EventCounter, EventNumber};
pub use factory::{Factory, FactoryBuilder};
pub use group::{LocalGroup, ProcessGroup, Standalone};
pub use registry::{
    DuplicatePolicy, LiveObject, Ownership, ReadOption, RegistrationState, Registry, RegistryEntry,
};
pub use session::Session;
pub use watch::{FileMonitor, FileState, ModificationChecking, WatchHandle};
