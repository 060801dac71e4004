//! PID file handling.
//!
//! The file holds the daemon's process id in decimal followed by a newline.
//! A daemon counts as running when the file exists, parses, and the process
//! it names answers signal 0.

use crate::error::{SupervisorError, SupervisorResult};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Parse PID file contents. Surrounding whitespace is ignored.
pub fn parse(content: &str, path: &Path) -> SupervisorResult<i32> {
    let trimmed = content.trim();
    let pid: i32 = trimmed.parse().map_err(|e| SupervisorError::Protocol {
        path: path.to_path_buf(),
        reason: format!("'{trimmed}' is not a process id ({e})"),
    })?;
    // 0 and negative values address process groups, never a daemon.
    if pid <= 0 {
        return Err(SupervisorError::Protocol {
            path: path.to_path_buf(),
            reason: format!("{pid} is not a valid process id"),
        });
    }
    Ok(pid)
}

/// Read the PID recorded in `path`, or `None` if the file does not exist.
///
/// # Errors
///
/// - `Io` if the file exists but cannot be read
/// - `Protocol` if the contents are not a positive decimal integer
pub fn read(path: &Path) -> SupervisorResult<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(content) => parse(&content, path).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SupervisorError::io(
            format!("Couldn't read PID file {}", path.display()),
            e,
        )),
    }
}

/// Write `pid` to `path`, creating parent directories as needed.
pub fn write(path: &Path, pid: u32) -> SupervisorResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                SupervisorError::io(format!("Couldn't create {}", parent.display()), e)
            })?;
        }
    }
    fs::write(path, format!("{pid}\n"))
        .map_err(|e| SupervisorError::io(format!("Couldn't write PID file {}", path.display()), e))
}

/// Remove the PID file. Returns `false` if it was already gone.
pub fn remove(path: &Path) -> SupervisorResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SupervisorError::io(
            format!("Couldn't remove PID file {}", path.display()),
            e,
        )),
    }
}

/// Liveness probe: signal 0. EPERM means the process exists but belongs to
/// someone else.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// PID of the live process owning `path`, if any.
///
/// Unreadable or malformed files are logged and treated as stale.
pub fn live_pid(path: &Path) -> Option<i32> {
    match read(path) {
        Ok(Some(pid)) if is_alive(pid) => Some(pid),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring PID file: {}", e);
            None
        }
    }
}

/// Time since the PID file was last written.
pub fn age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}
