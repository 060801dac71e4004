//! # Warden Supervisor Binary
//!
//! Runs the supervision daemon and controls it from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground until SIGINT/SIGTERM (SIGHUP reloads)
//! warden --config /etc/warden/warden.toml run
//!
//! # Stop / restart a running daemon
//! warden stop
//! warden restart
//!
//! # Inspect
//! warden status
//! warden logs web -n 100
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use warden::daemon::{self, Daemon, ShutdownOutcome};
use warden::health::{HealthChecker, HealthPolicy};
use warden::logging::{self, LogSink};
use warden::manager::Manager;
use warden::{SupervisorError, SupervisorResult, pidfile, probe};
use warden_common::config::{ConfigLoader, LogLevel, WardenConfig};
use warden_common::consts::{
    DAEMON_RESTART_PAUSE, DEFAULT_CONFIG_PATH, DEFAULT_LOG_LINES, DEFAULT_SHUTDOWN_WAIT,
};

/// Warden - process supervisor
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Launches, monitors, restarts and health-checks long-running services")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs (and `status`) in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon in the foreground
    Run,
    /// Stop the running daemon
    Stop,
    /// Stop the running daemon, then run a new one
    Restart,
    /// Show daemon and service status
    Status,
    /// Print the last lines of a service log
    Logs {
        /// Service name
        service: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("warden: {e}");
        std::process::exit(1);
    }
}

async fn run() -> SupervisorResult<()> {
    let args = Args::parse();
    setup_tracing(&args);

    let config = WardenConfig::load(&args.config)?;
    config.validate()?;

    match args.command {
        Command::Run => run_daemon(config, args.verbose).await,
        Command::Stop => stop_daemon(&config).await,
        Command::Restart => {
            stop_daemon(&config).await?;
            tokio::time::sleep(DAEMON_RESTART_PAUSE).await;
            run_daemon(config, args.verbose).await
        }
        Command::Status => print_status(&config, args.json),
        Command::Logs { service, lines } => print_logs(&config, &service, lines),
    }
}

async fn run_daemon(config: WardenConfig, verbose: bool) -> SupervisorResult<()> {
    info!("Warden v{} starting...", env!("CARGO_PKG_VERSION"));

    let manager = Arc::new(Manager::new(&config.daemon.log_dir));
    let mut checkers = Vec::new();
    for descriptor in &config.services {
        let service = manager.add_service(descriptor.clone())?;
        if let Some(health) = &descriptor.health {
            let checker = HealthChecker::with_boxed_probe(
                &service,
                probe::from_config(&health.probe),
                HealthPolicy::from(health),
            )?;
            checkers.push(checker);
        }
    }
    info!("Loaded {} services from configuration", manager.len());

    let level = if verbose {
        LogLevel::Debug
    } else {
        config.shared.log_level
    };
    let daemon = checkers.into_iter().fold(
        Daemon::new(config.daemon.clone(), manager)
            .with_log_sink(LogSink::from_config(&config.daemon, level)),
        Daemon::with_health_checker,
    );

    daemon.start().await
}

async fn stop_daemon(config: &WardenConfig) -> SupervisorResult<()> {
    match daemon::shutdown_running(&config.daemon.pid_file, DEFAULT_SHUTDOWN_WAIT).await? {
        ShutdownOutcome::NotRunning => println!("Daemon is not running"),
        ShutdownOutcome::Stopped { pid } => println!("Daemon stopped (PID: {pid})"),
        ShutdownOutcome::Killed { pid } => println!("Daemon killed (PID: {pid})"),
    }
    Ok(())
}

/// Snapshot printed by `warden status`.
#[derive(Debug, Serialize)]
struct StatusReport {
    running: bool,
    pid: Option<i32>,
    uptime_secs: Option<u64>,
    services: Vec<ServiceLog>,
}

#[derive(Debug, Serialize)]
struct ServiceLog {
    name: String,
    log_file: PathBuf,
}

impl StatusReport {
    fn collect(config: &WardenConfig) -> Self {
        let pid_file = &config.daemon.pid_file;
        let pid = pidfile::live_pid(pid_file);
        Self {
            running: pid.is_some(),
            pid,
            uptime_secs: pid
                .and_then(|_| pidfile::age(pid_file))
                .map(|age| age.as_secs()),
            services: config
                .services
                .iter()
                .map(|service| ServiceLog {
                    name: service.name.clone(),
                    log_file: service.log_path(&config.daemon.log_dir),
                })
                .collect(),
        }
    }
}

fn print_status(config: &WardenConfig, json: bool) -> SupervisorResult<()> {
    let report = StatusReport::collect(config);
    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| {
            SupervisorError::Configuration(format!("Couldn't encode status: {e}"))
        })?;
        println!("{text}");
        return Ok(());
    }

    match report.pid {
        Some(pid) => {
            println!("Daemon: Running");
            println!("PID: {pid}");
            if let Some(uptime) = report.uptime_secs {
                println!("Uptime: {uptime}s");
            }
        }
        None => println!("Daemon: Stopped"),
    }

    println!();
    println!("Services:");
    for service in &report.services {
        println!("  {:<20} {}", service.name, service.log_file.display());
    }
    Ok(())
}

fn print_logs(config: &WardenConfig, service: &str, lines: usize) -> SupervisorResult<()> {
    let Some(path) = config.service_log_path(service) else {
        return Err(SupervisorError::NotFound {
            name: service.to_string(),
        });
    };
    for line in logging::tail_lines(&path, lines)? {
        println!("{line}");
    }
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
