//! # Service state machine
//!
//! A [`Service`] wraps one [`ServiceDescriptor`] and drives its process
//! through `Stopped → Running → (Restarting → Running)* → Stopped | Crashed`.
//!
//! # Locking
//!
//! Two locks guard a service:
//!
//! - `state` (`parking_lot::Mutex`) holds status, counters and the current
//!   run. It is only ever held for short, non-blocking sections and never
//!   across an `.await`.
//! - `lifecycle` (`tokio::sync::Mutex`) serializes the state changes that
//!   launch or detach a process: `start()`, the first half of `stop()` and
//!   the monitor's respawn. It is held across a spawn but never while
//!   waiting for a process to exit: `stop()` detaches the run under the
//!   lock, then signals and waits with the lock released. The detached
//!   process keeps its own monitor, whose generation is superseded by any
//!   later launch.
//!
//! # Stop wins
//!
//! `stop()` flips the status to `Stopped` under `state` before it touches
//! the process. The monitor checks the status under the same lock after
//! the exit, so a stopped service is never restarted. Each launch bumps a
//! generation counter; a monitor whose generation has been superseded
//! leaves the state alone.

use crate::error::{SupervisorError, SupervisorResult};
use crate::process;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};
use warden_common::consts::KILL_WAIT;
use warden_common::service::{ServiceDescriptor, ServiceInfo, ServiceStatus};

/// Handle to one supervised process. Cloning is cheap and every clone
/// refers to the same service.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

/// Non-owning reference to a service, for observers such as health
/// checkers whose lifetime is independent of the service's.
#[derive(Clone)]
pub struct WeakService {
    inner: Weak<ServiceInner>,
}

impl WeakService {
    pub fn upgrade(&self) -> Option<Service> {
        self.inner.upgrade().map(|inner| Service { inner })
    }
}

struct ServiceInner {
    descriptor: ServiceDescriptor,
    log_path: PathBuf,
    state: Mutex<ServiceState>,
    lifecycle: tokio::sync::Mutex<()>,
}

struct ServiceState {
    status: ServiceStatus,
    restart_count: u32,
    /// Set while Running.
    started_at: Option<Instant>,
    /// Bumped on every launch.
    generation: u64,
    /// Cancelled by `stop()`; replaced by every explicit `start()`.
    cancel: CancellationToken,
    /// Present iff Running.
    run: Option<Run>,
}

/// The live process as seen from outside its monitor.
struct Run {
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Signal>,
    exited: oneshot::Receiver<()>,
    log: File,
}

/// Everything the monitor task owns for one run.
struct Monitor {
    child: Child,
    control: mpsc::UnboundedReceiver<Signal>,
    exited: oneshot::Sender<()>,
    generation: u64,
}

enum ExitAction {
    Done,
    Restart {
        delay: Duration,
        cancel: CancellationToken,
    },
}

impl Service {
    /// Create a stopped service. Zero-valued policy fields are replaced by
    /// defaults and the log file defaults to `<log_dir>/<name>.log`.
    pub fn new(descriptor: ServiceDescriptor, log_dir: &Path) -> Self {
        let descriptor = descriptor.with_defaults(log_dir);
        let log_path = descriptor.log_path(log_dir);
        Self {
            inner: Arc::new(ServiceInner {
                descriptor,
                log_path,
                state: Mutex::new(ServiceState {
                    status: ServiceStatus::Stopped,
                    restart_count: 0,
                    started_at: None,
                    generation: 0,
                    cancel: CancellationToken::new(),
                    run: None,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakService {
        WeakService {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.inner.descriptor
    }

    pub fn log_path(&self) -> &Path {
        &self.inner.log_path
    }

    pub fn status(&self) -> ServiceStatus {
        self.inner.state.lock().status
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.state.lock().restart_count
    }

    /// PID of the current process, if running.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().run.as_ref().and_then(|run| run.pid)
    }

    /// Snapshot for status queries. Uptime and PID only while running.
    pub fn info(&self) -> ServiceInfo {
        let state = self.inner.state.lock();
        let running = state.status == ServiceStatus::Running;
        ServiceInfo {
            name: self.inner.descriptor.name.clone(),
            status: state.status,
            restart_count: state.restart_count,
            log_file: self.inner.log_path.clone(),
            uptime: state
                .started_at
                .filter(|_| running)
                .map(|started| started.elapsed()),
            pid: state.run.as_ref().filter(|_| running).and_then(|run| run.pid),
        }
    }

    /// Launch the process and its monitor.
    ///
    /// An explicit start also clears the crash counter, which is how a
    /// `Crashed` service is brought back.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if the service is running
    /// - `Io` / `Launch` if the log file or process could not be opened;
    ///   the status is left untouched
    pub async fn start(&self) -> SupervisorResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.status() == ServiceStatus::Running {
            return Err(SupervisorError::AlreadyRunning {
                name: self.name().to_string(),
            });
        }

        let (child, log) = process::launch(&self.inner.descriptor, &self.inner.log_path)?;

        let monitor = {
            let mut state = self.inner.state.lock();
            // A monitor still in backoff from an earlier run wakes up and
            // finds its generation superseded.
            std::mem::replace(&mut state.cancel, CancellationToken::new()).cancel();
            state.restart_count = 0;
            self.attach(&mut state, child, log)
        };

        info!(
            "[{}] Service started (PID: {})",
            self.name(),
            display_pid(self.pid())
        );
        self.spawn_monitor(monitor);
        Ok(())
    }

    /// Stop the service: SIGTERM, then SIGKILL after the grace period.
    ///
    /// Succeeds immediately if already stopped. Stopping a service that is
    /// waiting out its restart backoff cancels the pending restart.
    ///
    /// The lifecycle lock is released before the grace period starts, so a
    /// racing `stop()` returns at once and a racing `start()` launches a new
    /// process while the old one is still being terminated.
    pub async fn stop(&self) -> SupervisorResult<()> {
        let run = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let mut state = self.inner.state.lock();
            if state.status == ServiceStatus::Stopped {
                return Ok(());
            }
            state.status = ServiceStatus::Stopped;
            state.started_at = None;
            state.cancel.cancel();
            state.run.take()
        };

        match run {
            Some(run) => self.terminate(run).await,
            None => info!("[{}] Service stopped", self.name()),
        }
        Ok(())
    }

    fn attach(&self, state: &mut ServiceState, child: Child, log: File) -> Monitor {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited_rx) = oneshot::channel();

        state.generation += 1;
        state.status = ServiceStatus::Running;
        state.started_at = Some(Instant::now());
        state.run = Some(Run {
            pid: child.id(),
            control: control_tx,
            exited: exited_rx,
            log,
        });

        Monitor {
            child,
            control: control_rx,
            exited: exited_tx,
            generation: state.generation,
        }
    }

    fn spawn_monitor(&self, monitor: Monitor) {
        let service = self.clone();
        tokio::spawn(service.supervise(monitor).with_current_subscriber());
    }

    async fn supervise(self, mut monitor: Monitor) {
        loop {
            let Monitor {
                mut child,
                mut control,
                exited,
                generation,
            } = monitor;

            let exit = process::wait_for_exit(&mut child, &mut control).await;
            let _ = exited.send(());

            let (delay, cancel) = match self.on_exit(generation, exit) {
                ExitAction::Done => return,
                ExitAction::Restart { delay, cancel } => (delay, cancel),
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!("[{}] Pending restart cancelled", self.name());
                    return;
                }
            }

            monitor = match self.respawn(generation).await {
                Some(next) => next,
                None => return,
            };
        }
    }

    /// Classify an exit and decide whether to restart.
    fn on_exit(&self, generation: u64, exit: std::io::Result<ExitStatus>) -> ExitAction {
        let descriptor = &self.inner.descriptor;
        let name = descriptor.name.as_str();
        let mut state = self.inner.state.lock();

        if state.generation != generation {
            return ExitAction::Done;
        }
        if state.status == ServiceStatus::Stopped {
            debug!("[{}] Process exited after stop", name);
            return ExitAction::Done;
        }

        // Closes the parent's log handle.
        state.run = None;
        let runtime = state
            .started_at
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let outcome = match &exit {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {e}"),
        };

        let crashed = runtime < descriptor.crash_threshold;
        if crashed {
            warn!(
                "[{}] Service crashed after {:?} ({}), restart count {}/{}",
                name, runtime, outcome, state.restart_count, descriptor.max_restarts
            );
        } else {
            state.restart_count = 0;
            info!("[{}] Service exited after {:?} ({})", name, runtime, outcome);
        }

        if !descriptor.auto_restart {
            if crashed {
                state.restart_count += 1;
            }
            state.status = ServiceStatus::Stopped;
            info!("[{}] Auto-restart disabled, service stopped", name);
            return ExitAction::Done;
        }

        if crashed {
            if state.restart_count >= descriptor.max_restarts {
                state.status = ServiceStatus::Crashed;
                error!(
                    "[{}] Max restarts reached ({}), giving up",
                    name, descriptor.max_restarts
                );
                return ExitAction::Done;
            }
            state.restart_count += 1;
        }

        state.status = ServiceStatus::Restarting;
        info!(
            "[{}] Restarting in {:?}...",
            name, descriptor.restart_delay
        );
        ExitAction::Restart {
            delay: descriptor.restart_delay,
            cancel: state.cancel.clone(),
        }
    }

    async fn respawn(&self, generation: u64) -> Option<Monitor> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let name = self.name();

        {
            let state = self.inner.state.lock();
            if state.generation != generation || state.status != ServiceStatus::Restarting {
                debug!("[{}] Restart abandoned, status is {}", name, state.status);
                return None;
            }
        }

        // The lifecycle guard keeps start/stop out; stale monitors never
        // write, so the status cannot move while the process launches.
        let launched = process::launch(&self.inner.descriptor, &self.inner.log_path);

        let mut state = self.inner.state.lock();
        match launched {
            Ok((child, log)) => {
                let monitor = self.attach(&mut state, child, log);
                info!(
                    "[{}] Service restarted (PID: {})",
                    name,
                    display_pid(state.run.as_ref().and_then(|run| run.pid))
                );
                Some(monitor)
            }
            Err(e) => {
                error!("[{}] Restart failed: {}", name, e);
                state.status = ServiceStatus::Crashed;
                None
            }
        }
    }

    async fn terminate(&self, run: Run) {
        let name = self.name();
        let grace = self.inner.descriptor.stop_timeout;
        let Run {
            pid,
            control,
            mut exited,
            log,
        } = run;

        info!("[{}] Sending SIGTERM (PID: {})...", name, display_pid(pid));
        // A closed channel means the monitor already saw the exit.
        if control.send(Signal::SIGTERM).is_ok() {
            match timeout(grace, &mut exited).await {
                Ok(_) => info!("[{}] Service stopped gracefully", name),
                Err(_) => {
                    warn!(
                        "[{}] Graceful shutdown timed out after {:?}, forcing kill...",
                        name, grace
                    );
                    if control.send(Signal::SIGKILL).is_ok()
                        && timeout(KILL_WAIT, &mut exited).await.is_err()
                    {
                        error!("[{}] Process still alive {:?} after SIGKILL", name, KILL_WAIT);
                    }
                }
            }
        } else {
            info!("[{}] Service stopped", name);
        }

        drop(log);
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

fn display_pid(pid: Option<u32>) -> String {
    pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
}
