//! Log sinks and log file helpers.
//!
//! The daemon never touches the global subscriber. Its log file is an
//! explicit [`LogSink`] that becomes a `Dispatch` scoped to the daemon's
//! supervision future; tasks spawned from inside carry it along via
//! `with_current_subscriber`.

use crate::error::{SupervisorError, SupervisorResult};
use crate::process;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use warden_common::config::{DaemonConfig, LogLevel};

/// Where the daemon's own log lines go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Whatever subscriber is current (stderr for the binary).
    #[default]
    Inherit,
    /// Append to a file at the given level.
    File { path: PathBuf, level: LogLevel },
}

impl LogSink {
    pub fn from_config(daemon: &DaemonConfig, level: LogLevel) -> Self {
        match &daemon.log_file {
            Some(path) => Self::File {
                path: path.clone(),
                level,
            },
            None => Self::Inherit,
        }
    }

    /// Open the sink. `None` means keep the current dispatcher.
    ///
    /// # Errors
    ///
    /// `Io` if the log file cannot be created or opened.
    pub fn open(&self) -> SupervisorResult<Option<Dispatch>> {
        match self {
            Self::Inherit => Ok(None),
            Self::File { path, level } => {
                let file = process::open_log(path)?;
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new(level.as_directive()))
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .finish();
                Ok(Some(Dispatch::new(subscriber)))
            }
        }
    }
}

/// Last `count` non-empty lines of a log file.
pub fn tail_lines(path: &Path, count: usize) -> SupervisorResult<Vec<String>> {
    let bytes = fs::read(path)
        .map_err(|e| SupervisorError::io(format!("Couldn't read log file {}", path.display()), e))?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().filter(|line| !line.is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}
