//! Structured errors shared by every subsystem.
//!
//! Every fallible call returns [`LiveResult`]. The error value is an
//! [`ErrorRecord`]: what went wrong ([`ErrorKind`]), how bad it is
//! ([`Severity`]), where it was detected ([`SourceLocation`]) and, for
//! configuration problems, where it came from ([`Origin`]).
//!
//! What happens to a fatal record at the outermost boundary is decided by
//! [`AbortPolicy`]: hand it back to the embedding caller, or print the report
//! and terminate the process (and the rest of its group).

mod policy;

pub use policy::{
    AbortPolicy, Disposition, EXIT_FAILURE, FORCE_ABORT_ENV, FatalMode, JobInfoFile, JobTracker,
};

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used throughout the crate.
pub type LiveResult<T> = Result<T, ErrorRecord>;

/// How serious an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Logged; the operation continues with a documented fallback.
    Warning,
    /// Execution must stop.
    Fatal,
}

/// Error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("duplicate registration of '{name}'")]
    DuplicateRegistration { name: String },

    #[error("unknown {table} type '{key}'")]
    UnknownTypeKey {
        table: String,
        key: String,
        valid: Vec<String>,
    },

    #[error("{table} type '{key}' registered twice")]
    DuplicateBuilder { table: String, key: String },

    #[error("{path} is already watched")]
    DuplicateWatch { path: PathBuf },

    #[error("missing required entry '{key}'")]
    ConfigMissingRequiredKey { key: String },

    #[error("malformed {}", describe_entry(.key))]
    ConfigMalformed { key: Option<String> },

    #[error("group abort requested by rank {origin_rank}")]
    GroupAbortRequested { origin_rank: usize, code: i32 },

    #[error("'{name}' is not registered")]
    NotRegistered { name: String },

    #[error("cannot watch {path}")]
    WatchFailed { path: PathBuf },

    #[error("collective operation failed")]
    Collective,

    #[error("I/O failure")]
    Io,
}

fn describe_entry(key: &Option<String>) -> String {
    match key {
        Some(key) => format!("entry '{key}'"),
        None => "document".to_string(),
    }
}

/// Code location that detected the problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            function: None,
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Line range inside a configuration source. Either end may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn at(line: u32) -> Self {
        Self {
            start: Some(line),
            end: None,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, " from line {start} to line {end}."),
            (Some(start), None) => write!(f, " at line {start}."),
            _ => Ok(()),
        }
    }
}

/// Configuration source an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub file: String,
    #[serde(default)]
    pub lines: LineRange,
}

/// A fully described error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl ErrorRecord {
    #[track_caller]
    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Fatal,
            message: message.into(),
            location: SourceLocation::caller(),
            origin: None,
        }
    }

    #[track_caller]
    pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            location: SourceLocation::caller(),
            origin: None,
        }
    }

    /// Wrap an I/O failure on `path`.
    #[track_caller]
    pub fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::fatal(ErrorKind::Io, format!("{}: {err}", path.display()))
    }

    /// Name the function that detected the problem.
    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.location.function = Some(function.into());
        self
    }

    /// Attach the configuration source the problem was found in.
    pub fn with_origin(mut self, file: impl Into<String>, lines: LineRange) -> Self {
        self.origin = Some(Origin {
            file: file.into(),
            lines,
        });
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// True for the synthetic error raised when a peer aborted the group.
    pub fn is_group_abort(&self) -> bool {
        matches!(self.kind, ErrorKind::GroupAbortRequested { .. })
    }

    /// Dictionary form handed to job-tracking collaborators.
    pub fn to_dict(&self) -> serde_json::Value {
        // Plain data with string keys; cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_dict(dict: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(dict.clone())
    }

    /// Formatted report block.
    ///
    /// `detail` adds the detecting function and source location.
    pub fn report(&self, detail: bool) -> String {
        let title = match (self.severity, self.origin.is_some()) {
            (Severity::Fatal, true) => "--> LIVEDIR FATAL IO ERROR:",
            (Severity::Fatal, false) => "--> LIVEDIR FATAL ERROR:",
            (Severity::Warning, _) => "--> LIVEDIR Warning :",
        };

        let mut out = format!("\n{title}\n{}\n", self.message);
        if let Some(origin) = &self.origin {
            out.push_str(&format!("\nfile: {}{}", origin.file, origin.lines));
        }
        if detail {
            let function = self.location.function.as_deref().unwrap_or("<unknown>");
            out.push_str(&format!(
                "\n\n    From function {function}\n    in file {} at line {}.",
                self.location.file, self.location.line
            ));
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ErrorRecord {
        ErrorRecord::fatal(
            ErrorKind::ConfigMissingRequiredKey {
                key: "type".to_string(),
            },
            "Entry 'type' not found in dictionary case.toml/objects/a",
        )
        .in_function("Dictionary::get_required")
        .with_origin("case.toml", LineRange::new(3, 7))
    }

    #[test]
    fn test_dict_round_trip() {
        let record = sample();
        let dict = record.to_dict();

        assert_eq!(dict["severity"], "fatal");
        assert_eq!(dict["kind"]["type"], "config_missing_required_key");
        assert_eq!(dict["origin"]["lines"]["start"], 3);

        let back = ErrorRecord::from_dict(&dict).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_report_contains_origin_and_detail() {
        let record = sample();

        let brief = record.report(false);
        assert!(brief.contains("FATAL IO ERROR"));
        assert!(brief.contains("file: case.toml from line 3 to line 7."));
        assert!(!brief.contains("From function"));

        let full = record.report(true);
        assert!(full.contains("From function Dictionary::get_required"));
        assert!(full.contains("src/error/mod.rs"));
    }

    #[test]
    fn test_location_is_caller() {
        let line = line!() + 1;
        let record = ErrorRecord::warning(ErrorKind::Collective, "x");
        assert_eq!(record.location.line, line);
        assert!(!record.is_fatal());
    }

    #[test]
    fn test_line_range_display() {
        assert_eq!(LineRange::at(4).to_string(), " at line 4.");
        assert_eq!(LineRange::unknown().to_string(), "");
    }
}
