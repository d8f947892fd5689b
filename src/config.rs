//! Layered configuration for the live object directory.
//!
//! Sources, later ones winning:
//! - Default values
//! - TOML configuration file (`.livedir/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `LIVEDIR_` and use double
//! underscores to separate nested levels:
//! - `LIVEDIR_REGISTRY__DUPLICATES=fatal` sets `registry.duplicates`
//! - `LIVEDIR_WATCH__CHECKING=inotify` sets `watch.checking`
//! - `LIVEDIR_ERRORS__FATAL_MODE=unwind` sets `errors.fatal_mode`
//!
//! `LIVEDIR_ABORT` is not a setting; it is read directly when the abort
//! policy is built (see [`FORCE_ABORT_ENV`](crate::error::FORCE_ABORT_ENV)).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::FatalMode;
use crate::registry::DuplicatePolicy;
use crate::watch::ModificationChecking;

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".livedir";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub errors: ErrorsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for every module without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module levels, e.g. `registry = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    /// What a duplicate registration does: quiet, warn or fatal
    #[serde(default)]
    pub duplicates: DuplicatePolicy,

    /// Placeholder name allowed to collide silently
    #[serde(default = "default_region_name")]
    pub default_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// How file modification is detected
    #[serde(default)]
    pub checking: ModificationChecking,

    /// Watch backing files at all
    #[serde(default = "default_true")]
    pub runtime_modifiable: bool,

    /// Poll interval of the watch loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ErrorsConfig {
    /// unwind (return errors to the caller) or terminate
    #[serde(default)]
    pub fatal_mode: FatalMode,

    /// Report detail; 2 and above includes source locations
    #[serde(default = "default_error_level")]
    pub level: u8,

    /// Abort immediately on fatal errors
    #[serde(default)]
    pub force_abort: bool,

    /// Where fatal errors are recorded as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_dir: Option<PathBuf>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_region_name() -> String {
    "region0".to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_error_level() -> u8 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            logging: LoggingConfig::default(),
            registry: RegistryConfig::default(),
            watch: WatchConfig::default(),
            errors: ErrorsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::default(),
            default_name: default_region_name(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            checking: ModificationChecking::default(),
            runtime_modifiable: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            fatal_mode: FatalMode::default(),
            level: default_error_level(),
            force_abort: false,
            job_dir: None,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file (missing files are skipped)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nesting levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed("LIVEDIR_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find `.livedir/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.registry.duplicates, DuplicatePolicy::Warn);
        assert_eq!(settings.registry.default_name, "region0");
        assert_eq!(settings.watch.checking, ModificationChecking::Timestamp);
        assert!(settings.watch.runtime_modifiable);
        assert_eq!(settings.errors.fatal_mode, FatalMode::Terminate);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[registry]
duplicates = "fatal"

[watch]
checking = "inotify-coordinator"
runtime_modifiable = false

[errors]
fatal_mode = "unwind"
level = 0

[logging.modules]
registry = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.registry.duplicates, DuplicatePolicy::Fatal);
        assert_eq!(settings.watch.checking, ModificationChecking::InotifyCoordinator);
        assert!(!settings.watch.runtime_modifiable);
        assert_eq!(settings.errors.fatal_mode, FatalMode::Unwind);
        assert_eq!(settings.errors.level, 0);
        assert_eq!(settings.logging.modules["registry"], "debug");
        // Untouched sections keep their defaults
        assert_eq!(settings.watch.poll_interval_ms, 500);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.registry.duplicates = DuplicatePolicy::Quiet;
        settings.watch.poll_interval_ms = 50;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".livedir/settings.toml"));
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_invalid_enum_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[errors]\nfatal_mode = \"explode\"\n").unwrap();

        assert!(Settings::load_from(&config_path).is_err());
    }
}
