//! Process-launch contract.
//!
//! Given a descriptor and a log path, [`launch`] returns a running child
//! whose stdout and stderr are appended to the log file, plus the parent's
//! handle to that file. Each child leads its own process group so that
//! SIGTERM/SIGKILL reach any grandchildren it forks.
//!
//! The `Child` is owned by exactly one monitor task, which waits on it via
//! [`wait_for_exit`] and delivers signals requested over a control channel.

use crate::error::{SupervisorError, SupervisorResult};
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;
use warden_common::service::ServiceDescriptor;

/// Open (creating if needed) a log file in append mode.
pub fn open_log(path: &Path) -> SupervisorResult<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                SupervisorError::io(format!("Couldn't create log directory {}", parent.display()), e)
            })?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SupervisorError::io(format!("Couldn't open log file {}", path.display()), e))
}

/// Spawn the descriptor's executable with output redirected to `log_path`.
///
/// # Errors
///
/// - `SupervisorError::Io` if the log file cannot be opened
/// - `SupervisorError::Launch` if the executable cannot be spawned
pub fn launch(descriptor: &ServiceDescriptor, log_path: &Path) -> SupervisorResult<(Child, File)> {
    let log = open_log(log_path)?;
    let dup = |log: &File| {
        log.try_clone().map_err(|e| {
            SupervisorError::io(format!("Couldn't duplicate log handle {}", log_path.display()), e)
        })
    };
    let stdout = dup(&log)?;
    let stderr = dup(&log)?;

    let mut command = Command::new(&descriptor.command);
    command
        .args(&descriptor.args)
        .envs(&descriptor.env)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);
    if let Some(dir) = &descriptor.working_dir {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|source| SupervisorError::Launch {
        name: descriptor.name.clone(),
        source,
    })?;

    Ok((child, log))
}

/// Deliver `signal` to the process group led by `pid`, falling back to the
/// leader alone if the group is gone.
pub fn signal_group(pid: u32, signal: Signal) -> nix::Result<()> {
    let pid = Pid::from_raw(pid as i32);
    match killpg(pid, signal) {
        Ok(()) => Ok(()),
        Err(_) => kill(pid, signal),
    }
}

/// Wait for the child to exit while forwarding requested signals to it.
///
/// `Child::wait` is cancel safe, so re-entering it after a signal request
/// loses nothing. A closed control channel just disables that branch.
pub async fn wait_for_exit(
    child: &mut Child,
    control: &mut UnboundedReceiver<Signal>,
) -> std::io::Result<ExitStatus> {
    let pid = child.id();
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(signal) = control.recv() => {
                if let Some(pid) = pid {
                    if let Err(e) = signal_group(pid, signal) {
                        warn!("Couldn't send {} to PID {}: {}", signal, pid, e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn sh(name: &str, script: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn output_is_appended_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("nested").join("echo.log");
        let descriptor = sh("echo", "echo out; echo err >&2");

        for _ in 0..2 {
            let (mut child, _log) = launch(&descriptor, &log_path).unwrap();
            assert!(child.wait().await.unwrap().success());
        }

        let content = fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.matches("out").count(), 2, "{content}");
        assert_eq!(content.matches("err").count(), 2, "{content}");
    }

    #[tokio::test]
    async fn env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("env.log");
        let descriptor = sh("env", "echo \"$GREETING $(pwd)\"")
            .env("GREETING", "hello")
            .working_dir(dir.path());

        let (mut child, _log) = launch(&descriptor, &log_path).unwrap();
        child.wait().await.unwrap();

        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.starts_with("hello "), "{content}");
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = ServiceDescriptor::new("ghost", "/nonexistent/warden-test-binary");
        let result = launch(&descriptor, &dir.path().join("ghost.log"));
        assert!(matches!(result, Err(SupervisorError::Launch { ref name, .. }) if name == "ghost"));
    }

    #[tokio::test]
    async fn control_channel_delivers_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = sh("sleeper", "exec sleep 30");
        let (mut child, _log) = launch(&descriptor, &dir.path().join("s.log")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Signal::SIGTERM).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), wait_for_exit(&mut child, &mut rx))
            .await
            .expect("child should exit after SIGTERM")
            .unwrap();
        assert!(!status.success());
    }
}
