//! Error types for supervisor operations

use std::path::PathBuf;
use thiserror::Error;
use warden_common::config::ConfigError;

/// Errors returned by synchronous supervisor calls.
///
/// Failures detected inside monitor or health-check tasks are logged and
/// drive status transitions instead; they never surface here.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Invalid registration: duplicate name, bad descriptor or health policy
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No service registered under this name
    #[error("Service {name} not found")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// `start()` on a running service
    #[error("Service {name} is already running")]
    AlreadyRunning {
        /// Service name
        name: String,
    },

    /// The executable could not be spawned
    #[error("Couldn't start process for {name}: {source}")]
    Launch {
        /// Service name
        name: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// Log or PID file I/O failed
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Source IO error
        #[source]
        source: std::io::Error,
    },

    /// PID file contents are not a decimal process id
    #[error("Malformed PID file {}: {reason}", path.display())]
    Protocol {
        /// PID file path
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// A live daemon already owns the PID file
    #[error("Daemon is already running (PID {pid})")]
    DaemonRunning {
        /// PID recorded in the PID file
        pid: i32,
    },

    /// Configuration file error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SupervisorError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_error_mentions_service_and_cause() {
        let e = SupervisorError::Launch {
            name: "agg".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "binary not found"),
        };
        let msg = e.to_string();
        assert!(msg.contains("agg"), "{msg}");
        assert!(msg.contains("binary not found"), "{msg}");
    }

    #[test]
    fn config_errors_convert() {
        let e: SupervisorError = ConfigError::FileNotFound.into();
        assert!(matches!(e, SupervisorError::Config(ConfigError::FileNotFound)));
    }

    #[test]
    fn protocol_error_shows_path() {
        let e = SupervisorError::Protocol {
            path: PathBuf::from("/run/warden.pid"),
            reason: "not a number".into(),
        };
        assert!(e.to_string().contains("/run/warden.pid"));
    }
}
