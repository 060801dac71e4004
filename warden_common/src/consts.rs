//! System-wide defaults for the warden workspace.
//!
//! Single source of truth for restart policy defaults, grace periods and
//! default paths. Imported by both crates.

use std::time::Duration;

/// Restart budget applied when a descriptor leaves `max_restarts` at zero.
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Backoff before a crash-triggered restart.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Runs shorter than this are counted as crashes.
pub const DEFAULT_CRASH_THRESHOLD: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and SIGKILL when stopping a service.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for a process to disappear after SIGKILL.
pub const KILL_WAIT: Duration = Duration::from_secs(5);

/// Pause between stop and start for a manual restart.
pub const RESTART_SETTLE: Duration = Duration::from_secs(1);

/// Pause between StopAll and StartAll on a daemon reload (SIGHUP).
pub const RELOAD_SETTLE: Duration = Duration::from_secs(1);

/// Pause between stop and start when a health checker forces a restart.
pub const HEALTH_RESTART_SETTLE: Duration = Duration::from_secs(2);

/// Poll interval used while waiting for a signalled daemon to exit.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long `warden stop` waits before escalating to SIGKILL.
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Pause between stopping the old daemon and running a new one for
/// `warden restart`.
pub const DAEMON_RESTART_PAUSE: Duration = Duration::from_secs(2);

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/warden/warden.toml";

/// Default daemon PID file.
pub const DEFAULT_PID_FILE: &str = "/run/warden/warden.pid";

/// Default directory for per-service log files.
pub const DEFAULT_LOG_DIR: &str = "/var/log/warden";

/// Default number of lines shown by `warden logs`.
pub const DEFAULT_LOG_LINES: usize = 50;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_defaults_are_consistent() {
        assert!(DEFAULT_MAX_RESTARTS > 0);
        assert!(DEFAULT_RESTART_DELAY < DEFAULT_CRASH_THRESHOLD);
        assert!(RESTART_SETTLE <= HEALTH_RESTART_SETTLE);
    }

    #[test]
    fn shutdown_wait_covers_several_polls() {
        assert!(DEFAULT_SHUTDOWN_WAIT >= SHUTDOWN_POLL_INTERVAL * 2);
    }

    #[test]
    fn daemon_restart_pause_exceeds_reload_settle() {
        assert_eq!(DAEMON_RESTART_PAUSE, Duration::from_secs(2));
        assert!(DAEMON_RESTART_PAUSE > RELOAD_SETTLE);
    }
}
