//! Periodic health checking.
//!
//! A [`HealthChecker`] polls a [`HealthProbe`] on its own timer,
//! independently of the service's exit monitor. After `max_failures`
//! consecutive failures it forces a stop + start cycle on the service,
//! bypassing the crash/backoff accounting, then resets its counter.
//!
//! The checker only holds a weak reference to its service: starting or
//! stopping the checker never starts or stops the service, and a service
//! that has been dropped is simply no longer probed.

use crate::error::{SupervisorError, SupervisorResult};
use crate::probe::{HealthProbe, ProbeError};
use crate::service::{Service, WeakService};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};
use warden_common::consts::HEALTH_RESTART_SETTLE;
use warden_common::service::HealthCheckConfig;

/// Polling policy for a [`HealthChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Time between probes.
    pub interval: Duration,
    /// Per-probe timeout, strictly shorter than `interval`.
    pub timeout: Duration,
    /// Consecutive failures that force a restart.
    pub max_failures: u32,
    /// Pause between the forced stop and start.
    pub restart_settle: Duration,
}

impl HealthPolicy {
    pub fn new(interval: Duration, timeout: Duration, max_failures: u32) -> Self {
        Self {
            interval,
            timeout,
            max_failures,
            restart_settle: HEALTH_RESTART_SETTLE,
        }
    }

    pub fn restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }

    fn validate(&self) -> SupervisorResult<()> {
        if self.interval.is_zero() {
            return Err(SupervisorError::Configuration(
                "health interval must be positive".to_string(),
            ));
        }
        if self.timeout >= self.interval {
            return Err(SupervisorError::Configuration(format!(
                "health timeout ({:?}) must be shorter than interval ({:?})",
                self.timeout, self.interval
            )));
        }
        if self.max_failures == 0 {
            return Err(SupervisorError::Configuration(
                "health max_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&HealthCheckConfig> for HealthPolicy {
    fn from(config: &HealthCheckConfig) -> Self {
        Self::new(config.interval, config.timeout, config.max_failures)
    }
}

/// Liveness poller bound to one service.
pub struct HealthChecker {
    inner: Arc<CheckerInner>,
    task: Mutex<Option<CancellationToken>>,
}

struct CheckerInner {
    name: String,
    service: WeakService,
    probe: Box<dyn HealthProbe>,
    policy: HealthPolicy,
    failures: AtomicU32,
    forced_restarts: AtomicU64,
}

impl HealthChecker {
    /// Bind a probe to a service.
    ///
    /// # Errors
    ///
    /// `Configuration` if the interval is zero, the timeout is not shorter
    /// than the interval, or `max_failures` is zero.
    pub fn new(
        service: &Service,
        probe: impl HealthProbe + 'static,
        policy: HealthPolicy,
    ) -> SupervisorResult<Self> {
        Self::with_boxed_probe(service, Box::new(probe), policy)
    }

    pub fn with_boxed_probe(
        service: &Service,
        probe: Box<dyn HealthProbe>,
        policy: HealthPolicy,
    ) -> SupervisorResult<Self> {
        policy
            .validate()
            .map_err(|e| match e {
                SupervisorError::Configuration(msg) => {
                    SupervisorError::Configuration(format!("[{}] {msg}", service.name()))
                }
                other => other,
            })?;

        Ok(Self {
            inner: Arc::new(CheckerInner {
                name: service.name().to_string(),
                service: service.downgrade(),
                probe,
                policy,
                failures: AtomicU32::new(0),
                forced_restarts: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.inner.policy
    }

    /// Consecutive failures since the last success or forced restart.
    pub fn failure_count(&self) -> u32 {
        self.inner.failures.load(Ordering::SeqCst)
    }

    /// Number of forced restart cycles performed so far.
    pub fn forced_restarts(&self) -> u64 {
        self.inner.forced_restarts.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Start the polling task. No-op if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        tokio::spawn(inner.poll(cancel.clone()).with_current_subscriber());
        *task = Some(cancel);
        debug!(
            "[{}] Health checker started (every {:?})",
            self.inner.name, self.inner.policy.interval
        );
    }

    /// Stop the polling task. The service is left as it is.
    pub fn stop(&self) {
        if let Some(cancel) = self.task.lock().take() {
            cancel.cancel();
            debug!("[{}] Health checker stopped", self.inner.name);
        }
    }

    /// Run one probe cycle now, exactly as the polling task would.
    pub async fn check(&self) {
        self.inner.check().await;
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        if let Some(cancel) = self.task.get_mut().take() {
            cancel.cancel();
        }
    }
}

impl CheckerInner {
    async fn poll(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.policy.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.check().await,
            }
        }
    }

    async fn check(&self) {
        let Some(service) = self.service.upgrade() else {
            debug!("[{}] Service is gone, skipping health check", self.name);
            return;
        };

        let timeout = self.policy.timeout;
        let result = match tokio::time::timeout(timeout, self.probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                let previous = self.failures.swap(0, Ordering::SeqCst);
                if previous > 0 {
                    info!("[{}] Health check recovered", self.name);
                }
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "[{}] Health check failed ({}/{}): {}",
                    self.name, failures, self.policy.max_failures, e
                );
                if failures >= self.policy.max_failures {
                    error!(
                        "[{}] Max health check failures reached, restarting service",
                        self.name
                    );
                    self.force_restart(&service).await;
                    self.failures.store(0, Ordering::SeqCst);
                }
            }
        }
    }

    async fn force_restart(&self, service: &Service) {
        self.forced_restarts.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = service.stop().await {
            error!("[{}] Error stopping service: {}", self.name, e);
        }
        tokio::time::sleep(self.policy.restart_settle).await;
        if let Err(e) = service.start().await {
            error!("[{}] Error restarting service: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FnProbe;
    use warden_common::service::ServiceDescriptor;

    fn policy() -> HealthPolicy {
        HealthPolicy::new(Duration::from_secs(1), Duration::from_millis(100), 3)
    }

    fn service() -> Service {
        Service::new(
            ServiceDescriptor::new("probe-target", "/bin/true"),
            &std::env::temp_dir(),
        )
    }

    fn ok_probe() -> FnProbe<impl Fn() -> std::future::Ready<Result<(), ProbeError>>> {
        FnProbe::new(|| std::future::ready(Ok(())))
    }

    #[test]
    fn timeout_must_be_shorter_than_interval() {
        let bad = HealthPolicy::new(Duration::from_secs(1), Duration::from_secs(1), 3);
        let err = HealthChecker::new(&service(), ok_probe(), bad).err().unwrap();
        assert!(matches!(err, SupervisorError::Configuration(_)));
        assert!(err.to_string().contains("probe-target"), "{err}");
    }

    #[test]
    fn zero_max_failures_is_rejected() {
        let bad = HealthPolicy::new(Duration::from_secs(1), Duration::from_millis(10), 0);
        assert!(HealthChecker::new(&service(), ok_probe(), bad).is_err());
    }

    #[tokio::test]
    async fn start_and_stop_control_only_the_poller() {
        let service = service();
        let checker = HealthChecker::new(&service, ok_probe(), policy()).unwrap();
        assert!(!checker.is_running());

        checker.start();
        checker.start();
        assert!(checker.is_running());

        checker.stop();
        assert!(!checker.is_running());
        assert_eq!(service.status(), warden_common::service::ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn dropped_service_is_not_probed() {
        let service = service();
        let checker = HealthChecker::new(
            &service,
            FnProbe::new(|| async { Err(ProbeError::Failed("down".into())) }),
            policy(),
        )
        .unwrap();
        drop(service);

        checker.check().await;
        assert_eq!(checker.failure_count(), 0);
    }
}
