//! # Warden
//!
//! Process supervisor core: launches long-running services as child
//! processes, watches them exit, restarts them under a crash/backoff
//! policy, probes their health, and runs the whole set as a single daemon
//! guarded by a PID file.
//!
//! # Module Structure
//!
//! - [`service`] - One supervised process and its state machine
//! - [`manager`] - Named registry of services, bulk start/stop
//! - [`health`] - Periodic liveness checks that force restarts
//! - [`probe`] - Probe implementations (TCP, command, closure)
//! - [`daemon`] - PID file, signal handling, reload and shutdown
//! - [`process`] - Process launch, log redirection, signalling
//! - [`pidfile`] - PID file parsing and liveness
//! - [`signals`] - OS signal bridge
//! - [`logging`] - Daemon log sink and log tailing
//! - [`error`] - Error types
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Daemon                               │
//! │   PID file ◄── claim/release        signals ──► Reload/Stop   │
//! │                                                               │
//! │   ┌────────────────────────────┐    ┌──────────────────────┐  │
//! │   │          Manager           │    │    HealthChecker     │  │
//! │   │  name ──► Service (Arc)    │◄───│  (weak ref + probe)  │  │
//! │   └─────────────┬──────────────┘    └──────────────────────┘  │
//! │                 │ start/stop                                  │
//! │                 ▼                                             │
//! │        ┌─────────────────┐   exit    ┌──────────────────┐     │
//! │        │  child process  │ ────────► │  monitor task    │     │
//! │        │  (own pgroup)   │ ◄──────── │  crash/backoff   │     │
//! │        └─────────────────┘  respawn  └──────────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod daemon;
pub mod error;
pub mod health;
pub mod logging;
pub mod manager;
pub mod pidfile;
pub mod probe;
pub mod process;
pub mod service;
pub mod signals;

// Re-export key types for convenience
pub use crate::daemon::{Daemon, ShutdownOutcome};
pub use crate::error::{SupervisorError, SupervisorResult};
pub use crate::health::{HealthChecker, HealthPolicy};
pub use crate::logging::LogSink;
pub use crate::manager::Manager;
pub use crate::probe::{HealthProbe, ProbeError};
pub use crate::service::Service;
pub use crate::signals::DaemonSignal;
