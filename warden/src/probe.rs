//! Health probes.
//!
//! A probe is a single success/failure liveness check. The health checker
//! bounds every call with its own timeout, so probes do not need one.

use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;
use warden_common::service::ProbeConfig;

/// Why a probe reported the service unhealthy.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Failed(String),

    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Liveness check bound to one service by a `HealthChecker`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<(), ProbeError>;
}

/// Healthy when a TCP connection can be established.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        TcpStream::connect(&self.address).await?;
        Ok(())
    }
}

/// Healthy when the command exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: PathBuf,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        let status = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Failed(format!(
                "{} exited with {}",
                self.command.display(),
                status
            )))
        }
    }
}

/// Adapts an async closure into a probe.
pub struct FnProbe<F>(F);

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
{
    async fn probe(&self) -> Result<(), ProbeError> {
        (self.0)().await
    }
}

/// Build the probe described by a configuration entry.
pub fn from_config(config: &ProbeConfig) -> Box<dyn HealthProbe> {
    match config {
        ProbeConfig::Tcp { address } => Box::new(TcpProbe::new(address.clone())),
        ProbeConfig::Command { command, args } => {
            Box::new(CommandProbe::new(command.clone(), args.clone()))
        }
    }
}
