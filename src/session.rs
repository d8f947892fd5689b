//! Application session: settings, process group, fatal-error policy and the
//! registry, created together and torn down together.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::{AbortPolicy, Disposition, ErrorRecord, LiveResult};
use crate::group::{ProcessGroup, Standalone};
use crate::registry::Registry;
use crate::watch::FileMonitor;

/// Scope name of the session's registry.
pub const SESSION_SCOPE: &str = "session";

pub struct Session {
    settings: Settings,
    group: Arc<dyn ProcessGroup>,
    policy: AbortPolicy,
    registry: Registry,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("rank", &self.group.rank())
            .field("group_size", &self.group.group_size())
            .field("policy", &self.policy)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Session {
    /// Session with the monitor selected by `watch.checking`.
    pub fn new(settings: Settings, group: Arc<dyn ProcessGroup>) -> LiveResult<Self> {
        let monitor = settings.watch.checking.monitor()?;
        Ok(Self::with_monitor(settings, group, monitor))
    }

    pub fn with_monitor(
        settings: Settings,
        group: Arc<dyn ProcessGroup>,
        monitor: Box<dyn FileMonitor>,
    ) -> Self {
        let policy = AbortPolicy::from_config(&settings.errors);
        let registry = Registry::new(SESSION_SCOPE, monitor, group.clone())
            .configure(&settings.registry, &settings.watch);

        crate::debug_event!(
            "session",
            "created",
            "rank {} of {}, checking {}",
            group.rank(),
            group.group_size(),
            settings.watch.checking
        );

        Self {
            settings,
            group,
            policy,
            registry,
        }
    }

    /// Session of a process running on its own.
    pub fn standalone(settings: Settings) -> LiveResult<Self> {
        Self::new(settings, Arc::new(Standalone))
    }

    /// Replace the policy built from `[errors]`.
    pub fn with_policy(mut self, policy: AbortPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn group(&self) -> &dyn ProcessGroup {
        self.group.as_ref()
    }

    pub fn policy(&self) -> &AbortPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Apply the policy to a fatal record without ending the process.
    pub fn dispose(&self, record: ErrorRecord) -> Disposition {
        self.policy.dispose(record, self.group.as_ref())
    }

    /// Outermost boundary; see [`AbortPolicy::conclude`].
    pub fn conclude<T>(&self, result: LiveResult<T>) -> LiveResult<T> {
        self.policy.conclude(result, self.group.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FatalMode};
    use crate::registry::{DuplicatePolicy, RegistryEntry};

    #[test]
    fn test_registry_follows_settings() {
        let mut settings = Settings::default();
        settings.registry.duplicates = DuplicatePolicy::Fatal;

        let mut session = Session::standalone(settings).unwrap();
        let registry = session.registry_mut();
        registry.register(RegistryEntry::new("a", "t")).unwrap();

        let err = registry.register(RegistryEntry::new("a", "t")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_unwind_session_returns_errors() {
        let mut settings = Settings::default();
        settings.errors.fatal_mode = FatalMode::Unwind;
        let session = Session::standalone(settings)
            .unwrap()
            .with_policy(AbortPolicy::new(FatalMode::Unwind));

        let result: LiveResult<()> = Err(ErrorRecord::fatal(ErrorKind::Io, "disk gone"));
        let err = session.conclude(result).unwrap_err();
        assert_eq!(err.message, "disk gone");
    }

    #[test]
    fn test_standalone_session_is_coordinator() {
        let session = Session::standalone(Settings::default()).unwrap();
        assert!(session.group().is_coordinator());
        assert!(!session.group().is_parallel());
        assert_eq!(session.registry().scope(), SESSION_SCOPE);
    }
}
