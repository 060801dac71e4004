//! # Daemon
//!
//! Binds one [`Manager`] to the lifetime of this OS process: claims the PID
//! file, starts every service, then reacts to control signals until told
//! to shut down.
//!
//! ```text
//!   start() ──► PID file live? ──yes──► Err(DaemonRunning), no side effects
//!                    │ no
//!                    ▼
//!   write PID ─► open log sink ─► chdir ─► StartAll ─► health checkers
//!                                                  │
//!                     ┌────────────────────────────┘
//!                     ▼
//!              ┌─► wait for signal ── Reload ──► StopAll, settle, StartAll ─┐
//!              └────────────────────────────────────────────────────────────┘
//!                     │ Shutdown / channel closed
//!                     ▼
//!              stop(): checkers off, StopAll, remove PID file
//! ```

use crate::error::{SupervisorError, SupervisorResult};
use crate::health::HealthChecker;
use crate::logging::LogSink;
use crate::manager::Manager;
use crate::pidfile;
use crate::signals::{self, DaemonSignal};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};
use warden_common::config::DaemonConfig;
use warden_common::consts::{RELOAD_SETTLE, SHUTDOWN_POLL_INTERVAL};

/// The single long-lived supervisor process.
pub struct Daemon {
    config: DaemonConfig,
    manager: Arc<Manager>,
    log_sink: LogSink,
    health_checkers: Vec<HealthChecker>,
}

impl Daemon {
    pub fn new(config: DaemonConfig, manager: Arc<Manager>) -> Self {
        Self {
            config,
            manager,
            log_sink: LogSink::Inherit,
            health_checkers: Vec::new(),
        }
    }

    /// Route the daemon's own log lines to `sink` while it runs.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    /// Run `checker` alongside the services; it is started after StartAll
    /// and stopped on shutdown.
    pub fn with_health_checker(mut self, checker: HealthChecker) -> Self {
        self.health_checkers.push(checker);
        self
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// PID recorded in the PID file, if the file exists.
    pub fn pid(&self) -> SupervisorResult<Option<i32>> {
        pidfile::read(&self.config.pid_file)
    }

    /// Whether a live process owns the PID file.
    pub fn is_running(&self) -> bool {
        pidfile::live_pid(&self.config.pid_file).is_some()
    }

    /// Run the daemon until SIGINT or SIGTERM; SIGHUP reloads.
    ///
    /// # Errors
    ///
    /// - `DaemonRunning` if a live process already owns the PID file; in
    ///   that case nothing has been written, started or installed
    /// - `Io` if the PID file, log sink or working directory fail
    /// - the first StartAll error; services already started are stopped and
    ///   the PID file is removed
    pub async fn start(&self) -> SupervisorResult<()> {
        self.claim_pid_file()?;
        let signals = match signals::listen() {
            Ok(signals) => signals,
            Err(e) => {
                self.release_pid_file();
                return Err(e);
            }
        };
        self.run(signals).await
    }

    /// Like [`start`](Self::start), but control signals come from `signals`
    /// instead of the OS. A closed channel counts as shutdown.
    pub async fn start_with(&self, signals: mpsc::Receiver<DaemonSignal>) -> SupervisorResult<()> {
        self.claim_pid_file()?;
        self.run(signals).await
    }

    /// Stop health checkers and services, then remove the PID file.
    ///
    /// Safe to call repeatedly; a missing PID file is only logged.
    pub async fn stop(&self) -> SupervisorResult<()> {
        info!("Stopping daemon...");
        for checker in &self.health_checkers {
            checker.stop();
        }
        if let Err(e) = self.manager.stop_all().await {
            error!("Error stopping services: {}", e);
        }
        self.release_pid_file();
        info!("Daemon stopped");
        Ok(())
    }

    fn claim_pid_file(&self) -> SupervisorResult<()> {
        let path = &self.config.pid_file;
        if let Some(pid) = pidfile::live_pid(path) {
            return Err(SupervisorError::DaemonRunning { pid });
        }
        pidfile::write(path, std::process::id())
    }

    fn release_pid_file(&self) {
        let path = &self.config.pid_file;
        match pidfile::remove(path) {
            Ok(true) => debug!("Removed PID file {}", path.display()),
            Ok(false) => info!("PID file {} already removed", path.display()),
            Err(e) => error!("Error removing PID file: {}", e),
        }
    }

    async fn run(&self, signals: mpsc::Receiver<DaemonSignal>) -> SupervisorResult<()> {
        let dispatch = match self.log_sink.open() {
            Ok(dispatch) => dispatch,
            Err(e) => {
                self.release_pid_file();
                return Err(e);
            }
        };

        match dispatch {
            Some(dispatch) => self.supervise(signals).with_subscriber(dispatch).await,
            None => self.supervise(signals).await,
        }
    }

    async fn supervise(&self, mut signals: mpsc::Receiver<DaemonSignal>) -> SupervisorResult<()> {
        if let Some(dir) = &self.config.working_dir {
            if let Err(e) = std::env::set_current_dir(dir) {
                self.release_pid_file();
                return Err(SupervisorError::io(
                    format!("Couldn't change directory to {}", dir.display()),
                    e,
                ));
            }
        }

        info!(
            "Daemon started (PID: {}, {} services)",
            std::process::id(),
            self.manager.len()
        );

        if let Err(e) = self.manager.start_all().await {
            error!("Couldn't start services: {}", e);
            self.stop().await?;
            return Err(e);
        }
        for checker in &self.health_checkers {
            checker.start();
        }

        loop {
            match signals.recv().await {
                Some(DaemonSignal::Reload) => self.reload().await,
                Some(DaemonSignal::Shutdown) => {
                    info!("Received shutdown signal");
                    break;
                }
                None => {
                    warn!("Signal channel closed, shutting down");
                    break;
                }
            }
        }

        self.stop().await
    }

    async fn reload(&self) {
        info!("Reloading services...");
        if let Err(e) = self.manager.stop_all().await {
            error!("Error stopping services: {}", e);
        }
        tokio::time::sleep(RELOAD_SETTLE).await;
        if let Err(e) = self.manager.start_all().await {
            error!("Error starting services: {}", e);
        }
        for (name, status) in self.manager.get_all_status() {
            debug!("[{}] {} after reload", name, status);
        }
    }
}

/// Result of asking a running daemon to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No live process owned the PID file.
    NotRunning,
    /// The daemon exited after SIGTERM.
    Stopped { pid: i32 },
    /// The daemon ignored SIGTERM and was killed; the PID file was removed.
    Killed { pid: i32 },
}

/// Stop the daemon recorded in `pid_file` from another process.
///
/// Sends SIGTERM, polls every [`SHUTDOWN_POLL_INTERVAL`] for up to `wait`,
/// then escalates to SIGKILL and removes the PID file itself.
pub async fn shutdown_running(pid_file: &Path, wait: Duration) -> SupervisorResult<ShutdownOutcome> {
    let Some(pid) = pidfile::live_pid(pid_file) else {
        return Ok(ShutdownOutcome::NotRunning);
    };

    info!("Sending SIGTERM to daemon (PID: {})", pid);
    send(pid, Signal::SIGTERM)?;

    let gone = || !pidfile::is_alive(pid) || pidfile::live_pid(pid_file) != Some(pid);
    let deadline = Instant::now() + wait;
    loop {
        if gone() {
            info!("Daemon stopped");
            return Ok(ShutdownOutcome::Stopped { pid });
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL.min(deadline - now)).await;
    }

    warn!("Daemon didn't stop gracefully, forcing...");
    send(pid, Signal::SIGKILL)?;
    pidfile::remove(pid_file)?;
    Ok(ShutdownOutcome::Killed { pid })
}

fn send(pid: i32, signal: Signal) -> SupervisorResult<()> {
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SupervisorError::io(
            format!("Couldn't send {} to PID {}", signal, pid),
            e.into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_without_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = shutdown_running(&dir.path().join("warden.pid"), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::NotRunning);
    }

    #[tokio::test]
    async fn pid_reports_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::new(dir.path().join("warden.pid"));
        let daemon = Daemon::new(config, Arc::new(Manager::new(dir.path().join("logs"))));

        assert_eq!(daemon.pid().unwrap(), None);
        assert!(!daemon.is_running());

        pidfile::write(&daemon.config().pid_file, std::process::id()).unwrap();
        assert_eq!(daemon.pid().unwrap(), Some(std::process::id() as i32));
        assert!(daemon.is_running());
    }

    #[tokio::test]
    async fn stop_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::new(dir.path().join("warden.pid"));
        let daemon = Daemon::new(config, Arc::new(Manager::new(dir.path().join("logs"))));

        daemon.stop().await.unwrap();
        daemon.stop().await.unwrap();
        assert_eq!(daemon.pid().unwrap(), None);
    }
}
