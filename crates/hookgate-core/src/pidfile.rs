//! PID file bookkeeping and stale-process detection.

use std::fs;
use std::io;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

/// What a PID file on disk says about a previous daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileState {
    Absent,
    /// The recorded process no longer exists.
    Stale(u32),
    /// The recorded process is alive.
    Live(u32),
    /// The file exists but does not hold a PID.
    Unreadable,
}

/// Whether a process with this PID exists.
///
/// `EPERM` means the process exists but belongs to someone else.
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn read_pid(path: &Path) -> io::Result<Option<u32>> {
    let content = fs::read_to_string(path)?;
    Ok(content.trim().parse::<u32>().ok())
}

/// Inspect the PID file at `path`.
pub fn inspect(path: &Path) -> PidFileState {
    match read_pid(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => PidFileState::Absent,
        Err(_) | Ok(None) => PidFileState::Unreadable,
        Ok(Some(pid)) if process_alive(pid) => PidFileState::Live(pid),
        Ok(Some(pid)) => PidFileState::Stale(pid),
    }
}

/// Write the current process id to `path`, replacing whatever was there.
///
/// A live foreign PID is overwritten with a warning; a stale one silently.
pub fn write_pid_file(path: &Path) -> io::Result<u32> {
    let own = std::process::id();
    match inspect(path) {
        PidFileState::Live(pid) if pid != own => {
            warn!(pid, path = %path.display(), "PID file names a live process, overwriting");
        }
        PidFileState::Stale(pid) => {
            debug!(pid, path = %path.display(), "replacing stale PID file");
        }
        _ => {}
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{own}\n"))?;
    Ok(own)
}

/// Remove a file, treating "not found" as success.
pub fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
