//! Prelude module for common re-exports.
//!
//! ```rust
//! use warden_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, DaemonConfig, LogLevel, SharedConfig, WardenConfig,
};

// ─── Services ───────────────────────────────────────────────────────
pub use crate::service::{
    HealthCheckConfig, ProbeConfig, ServiceDescriptor, ServiceInfo, ServiceStatus,
};

// ─── Defaults ───────────────────────────────────────────────────────
pub use crate::consts::{
    DAEMON_RESTART_PAUSE, DEFAULT_CONFIG_PATH, DEFAULT_CRASH_THRESHOLD, DEFAULT_LOG_DIR,
    DEFAULT_MAX_RESTARTS, DEFAULT_PID_FILE, DEFAULT_RESTART_DELAY, DEFAULT_STOP_TIMEOUT,
};
