//! Service descriptors and status types.
//!
//! A [`ServiceDescriptor`] is the immutable description of one supervised
//! process. It is deserialized from the `[[services]]` tables of the warden
//! configuration, or built in code with the builder methods.
//!
//! Durations are written in TOML as (fractional) seconds under `*_secs`
//! keys. A zero value means "use the default" for the restart policy
//! fields; [`ServiceDescriptor::with_defaults`] resolves them.

use crate::config::ConfigError;
use crate::consts::{
    DEFAULT_CRASH_THRESHOLD, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY, DEFAULT_STOP_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─── Descriptor ─────────────────────────────────────────────────────

/// Immutable configuration for one supervised process.
///
/// # TOML Example
///
/// ```toml
/// [[services]]
/// name = "aggregator"
/// command = "/usr/local/bin/gator"
/// args = ["agg", "1m"]
/// max_restarts = 10
/// restart_delay_secs = 5
/// crash_threshold_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique registry key.
    pub name: String,

    /// Executable to launch.
    pub command: PathBuf,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Consecutive crash restarts allowed before giving up (0 = default).
    #[serde(default)]
    pub max_restarts: u32,

    /// Backoff before an automatic restart (0 = default).
    #[serde(default, rename = "restart_delay_secs", with = "secs")]
    pub restart_delay: Duration,

    /// Runs shorter than this count as crashes (0 = default).
    #[serde(default, rename = "crash_threshold_secs", with = "secs")]
    pub crash_threshold: Duration,

    /// Grace period between SIGTERM and SIGKILL (0 = default).
    #[serde(default, rename = "stop_timeout_secs", with = "secs")]
    pub stop_timeout: Duration,

    /// Log file receiving stdout and stderr. Defaults to `<log_dir>/<name>.log`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Restart the process when it exits on its own.
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,

    /// Working directory of the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Optional liveness probe.
    #[serde(default)]
    pub health: Option<HealthCheckConfig>,
}

fn default_auto_restart() -> bool {
    true
}

impl ServiceDescriptor {
    /// Create a descriptor with every policy field left at its default.
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            max_restarts: 0,
            restart_delay: Duration::ZERO,
            crash_threshold: Duration::ZERO,
            stop_timeout: Duration::ZERO,
            log_file: None,
            auto_restart: true,
            working_dir: None,
            env: BTreeMap::new(),
            health: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn crash_threshold(mut self, threshold: Duration) -> Self {
        self.crash_threshold = threshold;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace zero-valued policy fields and a missing log file with defaults.
    pub fn with_defaults(mut self, log_dir: &Path) -> Self {
        if self.max_restarts == 0 {
            self.max_restarts = DEFAULT_MAX_RESTARTS;
        }
        if self.restart_delay.is_zero() {
            self.restart_delay = DEFAULT_RESTART_DELAY;
        }
        if self.crash_threshold.is_zero() {
            self.crash_threshold = DEFAULT_CRASH_THRESHOLD;
        }
        if self.stop_timeout.is_zero() {
            self.stop_timeout = DEFAULT_STOP_TIMEOUT;
        }
        if self.log_file.is_none() {
            self.log_file = Some(log_dir.join(format!("{}.log", self.name)));
        }
        self
    }

    /// Resolved log file path, or `<log_dir>/<name>.log` when unset.
    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| log_dir.join(format!("{}.log", self.name)))
    }

    /// Validate the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `name` is empty or contains a path separator
    /// - `command` is empty
    /// - the health policy is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service name cannot be empty".to_string(),
            ));
        }
        if self.name.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "service name '{}' cannot contain '/'",
                self.name
            )));
        }
        if self.command.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "service '{}' has an empty command",
                self.name
            )));
        }
        if let Some(health) = &self.health {
            health.validate().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("service '{}': {msg}", self.name))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

// ─── Health check configuration ─────────────────────────────────────

/// Probe selection for a configured health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeConfig {
    /// Healthy when a TCP connection to `address` succeeds.
    Tcp { address: String },
    /// Healthy when `command` exits with status 0.
    Command {
        command: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Polling policy and probe for one service's health checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(flatten)]
    pub probe: ProbeConfig,

    /// Time between probes.
    #[serde(default = "default_health_interval", rename = "interval_secs", with = "secs")]
    pub interval: Duration,

    /// Per-probe timeout, strictly shorter than `interval`.
    #[serde(default = "default_health_timeout", rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,

    /// Consecutive failures that force a restart.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_failures() -> u32 {
    3
}

impl HealthCheckConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "health interval must be positive".to_string(),
            ));
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::ValidationError(format!(
                "health timeout ({:?}) must be shorter than interval ({:?})",
                self.timeout, self.interval
            )));
        }
        if self.max_failures == 0 {
            return Err(ConfigError::ValidationError(
                "health max_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not running, either initially or after an explicit stop.
    #[default]
    Stopped,
    /// Process is alive and monitored.
    Running,
    /// Waiting out the backoff before an automatic restart.
    Restarting,
    /// Restart budget exhausted; needs an explicit start.
    Crashed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Point-in-time snapshot of a service, as shown by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
    pub restart_count: u32,
    pub log_file: PathBuf,
    /// Present only while running.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "secs::option")]
    pub uptime: Option<Duration>,
    /// Present only while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

// ─── Serde helpers ──────────────────────────────────────────────────

/// `Duration` as fractional seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de::Error};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&d.as_secs_f64()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<f64>::deserialize(deserializer)?
                .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
                .transpose()
        }
    }
}
