//! OS signal bridge.
//!
//! Turns SIGHUP/SIGINT/SIGTERM into [`DaemonSignal`] messages so the daemon
//! loop only ever reads from a channel.

use crate::error::{SupervisorError, SupervisorResult};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;
use tracing::instrument::WithSubscriber;

/// Control requests delivered to a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// SIGHUP: StopAll, settle, StartAll.
    Reload,
    /// SIGINT / SIGTERM: stop everything and exit.
    Shutdown,
}

/// Install handlers for HUP, INT and TERM and forward them as messages.
///
/// # Errors
///
/// `Io` if a handler cannot be registered.
pub fn listen() -> SupervisorResult<mpsc::Receiver<DaemonSignal>> {
    let install = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| SupervisorError::io(format!("Couldn't install {name} handler"), e))
    };
    let mut hangup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;

    let (tx, rx) = mpsc::channel(8);
    let forward = async move {
        loop {
            let signal = tokio::select! {
                Some(()) = hangup.recv() => {
                    info!("Received SIGHUP");
                    DaemonSignal::Reload
                }
                Some(()) = interrupt.recv() => {
                    info!("Received SIGINT");
                    DaemonSignal::Shutdown
                }
                Some(()) = terminate.recv() => {
                    info!("Received SIGTERM");
                    DaemonSignal::Shutdown
                }
                else => return,
            };
            if tx.send(signal).await.is_err() {
                return;
            }
        }
    };
    tokio::spawn(forward.with_current_subscriber());
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{Signal, raise};
    use std::time::Duration;

    #[tokio::test]
    async fn os_signals_become_messages() {
        let mut signals = listen().unwrap();

        raise(Signal::SIGHUP).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv()).await;
        assert_eq!(received.unwrap(), Some(DaemonSignal::Reload));

        raise(Signal::SIGTERM).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv()).await;
        assert_eq!(received.unwrap(), Some(DaemonSignal::Shutdown));
    }
}
