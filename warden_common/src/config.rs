//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the warden TOML
//! configuration: a `[shared]` table, a `[daemon]` table and any number of
//! `[[services]]` tables.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_common::config::{ConfigError, ConfigLoader, WardenConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = WardenConfig::load(Path::new("/etc/warden/warden.toml"))?;
//!     config.validate()?;
//!     println!("{} services", config.services.len());
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_LOG_DIR, DEFAULT_PID_FILE};
use crate::service::ServiceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why `warden.toml` could not be turned into a usable [`WardenConfig`].
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the `--config` path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// Unreadable file or invalid TOML, including unknown probe kinds.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but a service, health check or shared setting is invalid.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Verbosity of the daemon's own log output (`[shared] log_level`).
///
/// Only applies to the daemon log file; `--verbose` overrides it with
/// `debug`. Service output is never filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Supervisor-wide settings from the `[shared]` table.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "warden"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Supervisor instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "warden".to_string(),
        }
    }
}

/// Daemon process settings.
///
/// # TOML Example
///
/// ```toml
/// [daemon]
/// pid_file = "/run/warden/warden.pid"
/// log_file = "/var/log/warden/warden.log"
/// log_dir = "/var/log/warden"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// File holding the daemon's process id.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Daemon log file. Logs go to stderr when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Directory the daemon switches into before starting services.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Default directory for per-service log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_pid_file() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            log_file: None,
            working_dir: None,
            log_dir: default_log_dir(),
        }
    }
}

impl DaemonConfig {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            ..Self::default()
        }
    }
}

/// Top-level warden configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub shared: SharedConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl WardenConfig {
    /// Validate shared settings and every service descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` on the first invalid
    /// descriptor or on a duplicated service name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let mut seen = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a configured service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Log file a service writes to, after applying the daemon's log dir.
    pub fn service_log_path(&self, name: &str) -> Option<PathBuf> {
        self.service(name)
            .map(|s| s.log_path(&self.daemon.log_dir))
    }
}

/// Reads a TOML file into any deserializable config type; `WardenConfig`
/// is the one the binary loads.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_directive_matches_serde_name() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            let encoded = toml::Value::try_from(level).unwrap();
            assert_eq!(encoded.as_str(), Some(level.as_directive()));
        }
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: TestWrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
            assert_eq!(level.as_directive(), text);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = WardenConfig::load(Path::new("/nonexistent/path/warden.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = WardenConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_full_config_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "warden-test"

[daemon]
pid_file = "/tmp/warden-test.pid"
log_dir = "/tmp/warden-logs"

[[services]]
name = "aggregator"
command = "/usr/local/bin/gator"
args = ["agg", "1m"]
max_restarts = 10

[[services]]
name = "web"
command = "/usr/local/bin/web"
auto_restart = false

[services.health]
kind = "tcp"
address = "127.0.0.1:8080"
interval_secs = 15
timeout_secs = 2.5
max_failures = 4
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = WardenConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.daemon.pid_file, PathBuf::from("/tmp/warden-test.pid"));
        assert_eq!(config.daemon.log_file, None);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].max_restarts, 10);
        assert!(!config.services[1].auto_restart);

        let health = config.services[1].health.as_ref().unwrap();
        assert_eq!(health.timeout, Duration::from_millis(2500));
        assert_eq!(health.max_failures, 4);

        assert_eq!(
            config.service_log_path("aggregator"),
            Some(PathBuf::from("/tmp/warden-logs/aggregator.log"))
        );
        assert_eq!(config.service_log_path("missing"), None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: WardenConfig = toml::from_str("").unwrap();
        assert_eq!(config.daemon, DaemonConfig::default());
        assert_eq!(config.shared.service_name, "warden");
        assert!(config.services.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_service_names_rejected() {
        let config = WardenConfig {
            services: vec![
                ServiceDescriptor::new("agg", "/bin/true"),
                ServiceDescriptor::new("agg", "/bin/false"),
            ],
            ..WardenConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }
}
