//! # Configuration File Tests
//!
//! Loads complete warden TOML files from disk through `ConfigLoader`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use warden_common::prelude::*;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_config_loads() {
    let file = write_config(
        r#"
[shared]
log_level = "debug"
service_name = "edge"

[daemon]
pid_file = "/tmp/warden-test/warden.pid"
log_dir = "/tmp/warden-test/logs"

[[services]]
name = "aggregator"
command = "/usr/local/bin/gator"
args = ["agg", "1m"]
max_restarts = 10
restart_delay_secs = 2.5

[services.env]
RUST_LOG = "info"

[services.health]
kind = "tcp"
address = "127.0.0.1:9000"
interval_secs = 10
timeout_secs = 2

[[services]]
name = "reporter"
command = "/usr/local/bin/report"
auto_restart = false
log_file = "/tmp/warden-test/report.log"
"#,
    );

    let config = WardenConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "edge");
    assert_eq!(config.daemon.pid_file, PathBuf::from("/tmp/warden-test/warden.pid"));
    assert_eq!(config.daemon.log_file, None);
    assert_eq!(config.services.len(), 2);

    let agg = config.service("aggregator").unwrap();
    assert_eq!(agg.args, vec!["agg", "1m"]);
    assert_eq!(agg.max_restarts, 10);
    assert_eq!(agg.restart_delay, Duration::from_millis(2500));
    assert!(agg.auto_restart);
    assert_eq!(agg.env.get("RUST_LOG").map(String::as_str), Some("info"));

    let health = agg.health.as_ref().unwrap();
    assert_eq!(
        health.probe,
        ProbeConfig::Tcp {
            address: "127.0.0.1:9000".to_string()
        }
    );
    assert_eq!(health.interval, Duration::from_secs(10));
    assert_eq!(health.timeout, Duration::from_secs(2));
    assert_eq!(health.max_failures, 3);

    let reporter = config.service("reporter").unwrap();
    assert!(!reporter.auto_restart);
    assert!(reporter.health.is_none());

    assert_eq!(
        config.service_log_path("aggregator"),
        Some(PathBuf::from("/tmp/warden-test/logs/aggregator.log"))
    );
    assert_eq!(
        config.service_log_path("reporter"),
        Some(PathBuf::from("/tmp/warden-test/report.log"))
    );
    assert_eq!(config.service_log_path("missing"), None);
}

#[test]
fn empty_file_uses_defaults() {
    let file = write_config("");
    let config = WardenConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.daemon.pid_file, PathBuf::from(DEFAULT_PID_FILE));
    assert_eq!(config.shared.service_name, "warden");
    assert!(config.services.is_empty());
}

#[test]
fn duplicate_services_fail_validation() {
    let file = write_config(
        r#"
[[services]]
name = "web"
command = "/bin/true"

[[services]]
name = "web"
command = "/bin/false"
"#,
    );
    let config = WardenConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(msg)) if msg.contains("web")
    ));
}

#[test]
fn health_timeout_must_be_shorter_than_interval() {
    let file = write_config(
        r#"
[[services]]
name = "probe"
command = "/bin/true"

[services.health]
kind = "command"
command = "/usr/bin/curl"
args = ["-f", "http://localhost/health"]
interval_secs = 5
timeout_secs = 5
"#,
    );
    let config = WardenConfig::load(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn unknown_probe_kind_is_parse_error() {
    let file = write_config(
        r#"
[[services]]
name = "probe"
command = "/bin/true"

[services.health]
kind = "http"
"#,
    );
    assert!(matches!(
        WardenConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}
