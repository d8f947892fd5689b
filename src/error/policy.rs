//! What happens to a fatal error at the outermost boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ErrorRecord, LiveResult};
use crate::config::ErrorsConfig;
use crate::group::ProcessGroup;

/// Exit status of every fatal-terminate path, local or group-initiated.
pub const EXIT_FAILURE: i32 = 1;

/// Environment switch sending every fatal error straight to `abort()`.
pub const FORCE_ABORT_ENV: &str = "LIVEDIR_ABORT";

/// Fatal handling, chosen once per process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalMode {
    /// Hand the record back to the embedding caller.
    Unwind,
    /// Print the report and end the process (and its group).
    #[default]
    Terminate,
}

/// Outcome decided for a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Return the record to the caller.
    Unwind(ErrorRecord),
    /// Orderly exit with this status.
    Exit(i32),
    /// Immediate abnormal termination.
    Abort,
}

/// External job bookkeeping that wants to hear about fatal errors.
pub trait JobTracker: Send + Sync {
    fn record(&self, key: &str, entry: serde_json::Value);
}

/// Job tracker that keeps a JSON object in a file.
#[derive(Debug, Clone)]
pub struct JobInfoFile {
    path: PathBuf,
}

impl JobInfoFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Job file `<dir>/<job>.json`.
    pub fn in_dir(dir: &Path, job: &str) -> Self {
        Self::new(dir.join(format!("{job}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> serde_json::Map<String, serde_json::Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }
}

impl JobTracker for JobInfoFile {
    fn record(&self, key: &str, entry: serde_json::Value) {
        let mut info = self.read();
        info.insert(key.to_string(), entry);

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("[job] cannot create {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(&info) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    warn!("[job] cannot write {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("[job] cannot encode job info: {e}"),
        }
    }
}

/// Fatal-error policy for one process.
#[derive(Clone, Default)]
pub struct AbortPolicy {
    mode: FatalMode,
    level: u8,
    force_abort: bool,
    tracker: Option<Arc<dyn JobTracker>>,
}

impl std::fmt::Debug for AbortPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortPolicy")
            .field("mode", &self.mode)
            .field("level", &self.level)
            .field("force_abort", &self.force_abort)
            .field("tracker", &self.tracker.is_some())
            .finish()
    }
}

impl AbortPolicy {
    pub fn new(mode: FatalMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Policy from configuration; [`FORCE_ABORT_ENV`] can switch on force abort.
    pub fn from_config(config: &ErrorsConfig) -> Self {
        let mut policy = Self::new(config.fatal_mode)
            .with_level(config.level)
            .with_force_abort(config.force_abort || force_abort_from_env());
        if let Some(dir) = &config.job_dir {
            policy = policy.with_tracker(Arc::new(JobInfoFile::in_dir(dir, "job")));
        }
        policy
    }

    /// Report verbosity; level 2 and above includes the detecting location.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_force_abort(mut self, force_abort: bool) -> Self {
        self.force_abort = force_abort;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn JobTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn mode(&self) -> FatalMode {
        self.mode
    }

    pub fn force_abort(&self) -> bool {
        self.force_abort
    }

    /// Decide what to do with `record`, performing every side effect short of
    /// ending the process: job bookkeeping, the printed report and the group
    /// abort.
    pub fn dispose(&self, record: ErrorRecord, group: &dyn ProcessGroup) -> Disposition {
        if !record.is_fatal() {
            warn!("{}", record.report(self.level >= 2));
            return Disposition::Unwind(record);
        }

        // A peer already reported its own error and aborted the group.
        let peer_abort = record.is_group_abort();

        if self.mode == FatalMode::Terminate && !peer_abort {
            if let Some(tracker) = &self.tracker {
                tracker.record("FatalError", record.to_dict());
            }
        }

        if self.force_abort {
            eprintln!(
                "{}\nLIVEDIR aborting ({FORCE_ABORT_ENV} set)\n",
                record.report(self.level >= 2)
            );
            return Disposition::Abort;
        }

        if self.mode == FatalMode::Unwind {
            return Disposition::Unwind(record);
        }

        if peer_abort {
            eprintln!(
                "\nLIVEDIR parallel run exiting on rank {}: {}\n",
                group.rank(),
                record.message
            );
            return Disposition::Exit(EXIT_FAILURE);
        }

        eprintln!("{}", record.report(self.level >= 2));
        if group.is_parallel() {
            eprintln!("\nLIVEDIR parallel run exiting\n");
            group.barrier_abort(EXIT_FAILURE);
        } else {
            eprintln!("\nLIVEDIR exiting\n");
        }
        Disposition::Exit(EXIT_FAILURE)
    }

    /// Outermost boundary: apply the policy to `result`.
    ///
    /// Returns the error only in unwind mode; otherwise the process ends.
    pub fn conclude<T>(&self, result: LiveResult<T>, group: &dyn ProcessGroup) -> LiveResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(record) => match self.dispose(record, group) {
                Disposition::Unwind(record) => Err(record),
                Disposition::Exit(code) => {
                    debug!("[policy] exiting with status {code}");
                    std::process::exit(code)
                }
                Disposition::Abort => std::process::abort(),
            },
        }
    }
}

fn force_abort_from_env() -> bool {
    std::env::var(FORCE_ABORT_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}
