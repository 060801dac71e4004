//! # Health Checker Tests
//!
//! Probe failures against a live service: forced restart after
//! `max_failures`, counter reset on recovery, and the periodic poller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use warden::health::{HealthChecker, HealthPolicy};
use warden::probe::{FnProbe, HealthProbe, ProbeError};
use warden::service::Service;
use warden_common::service::{ServiceDescriptor, ServiceStatus};

// ─── Helpers ────────────────────────────────────────────────────────

fn sleeper(dir: &std::path::Path) -> Service {
    Service::new(
        ServiceDescriptor::new("target", "/bin/sh").args(["-c", "exec sleep 30"]),
        dir,
    )
}

/// Probe whose verdict is flipped through the returned flag.
fn switch_probe(healthy: bool) -> (Arc<AtomicBool>, impl HealthProbe + 'static) {
    let flag = Arc::new(AtomicBool::new(healthy));
    let probe_flag = flag.clone();
    let probe = FnProbe::new(move || {
        let healthy = probe_flag.load(Ordering::SeqCst);
        async move {
            if healthy {
                Ok(())
            } else {
                Err(ProbeError::Failed("unhealthy".to_string()))
            }
        }
    });
    (flag, probe)
}

fn policy(interval: Duration, timeout: Duration, max_failures: u32) -> HealthPolicy {
    HealthPolicy::new(interval, timeout, max_failures).restart_settle(Duration::from_millis(50))
}

// ─── Forced restart ─────────────────────────────────────────────────

#[tokio::test]
async fn max_failures_forces_one_restart_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let service = sleeper(dir.path());
    service.start().await.unwrap();
    let first_pid = service.pid().unwrap();

    let (_flag, probe) = switch_probe(false);
    let checker = HealthChecker::new(
        &service,
        probe,
        policy(Duration::from_secs(10), Duration::from_millis(100), 3),
    )
    .unwrap();

    checker.check().await;
    checker.check().await;
    assert_eq!(checker.failure_count(), 2);
    assert_eq!(checker.forced_restarts(), 0);
    assert_eq!(service.pid(), Some(first_pid));

    checker.check().await;
    assert_eq!(checker.forced_restarts(), 1);
    assert_eq!(checker.failure_count(), 0);
    assert_eq!(service.status(), ServiceStatus::Running);
    assert_ne!(service.pid(), Some(first_pid));
    // Forced restarts bypass crash accounting.
    assert_eq!(service.restart_count(), 0);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn success_resets_failure_count() {
    let dir = tempfile::tempdir().unwrap();
    let service = sleeper(dir.path());
    service.start().await.unwrap();

    let (flag, probe) = switch_probe(false);
    let checker = HealthChecker::new(
        &service,
        probe,
        policy(Duration::from_secs(10), Duration::from_millis(100), 3),
    )
    .unwrap();

    checker.check().await;
    checker.check().await;
    assert_eq!(checker.failure_count(), 2);

    flag.store(true, Ordering::SeqCst);
    checker.check().await;
    assert_eq!(checker.failure_count(), 0);
    assert_eq!(checker.forced_restarts(), 0);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn slow_probe_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = sleeper(dir.path());

    let probe = FnProbe::new(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    let checker = HealthChecker::new(
        &service,
        probe,
        policy(Duration::from_secs(10), Duration::from_millis(50), 3),
    )
    .unwrap();

    checker.check().await;
    assert_eq!(checker.failure_count(), 1);
}

// ─── Poller ─────────────────────────────────────────────────────────

#[tokio::test]
async fn poller_restarts_unhealthy_service() {
    let dir = tempfile::tempdir().unwrap();
    let service = sleeper(dir.path());
    service.start().await.unwrap();

    let (_flag, probe) = switch_probe(false);
    let checker = HealthChecker::new(
        &service,
        probe,
        policy(Duration::from_millis(100), Duration::from_millis(50), 2),
    )
    .unwrap();
    checker.start();

    let deadline = Instant::now() + Duration::from_secs(5);
    while checker.forced_restarts() == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(checker.forced_restarts() >= 1);

    checker.stop();
    assert!(!checker.is_running());
    // Stopping the checker leaves the service alone.
    let deadline = Instant::now() + Duration::from_secs(5);
    while service.status() != ServiceStatus::Running && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(service.status(), ServiceStatus::Running);

    service.stop().await.unwrap();
}
