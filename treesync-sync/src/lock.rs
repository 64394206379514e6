//! Push lock: at most one export talks to the remote at a time.
//!
//! The lock is the file `<home>/.treesync/push.lock`, created with
//! `create_new` so acquisition is atomic. [`PushLock`] removes it on drop.
//! A lock whose recorded pid is no longer running was left by a crashed
//! export; it does not count as held and the next acquire removes it.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use treesync_core::{layout, SiteConfig};

use crate::error::{io_err, SyncError};

/// Held push lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct PushLock {
    path: PathBuf,
}

impl PushLock {
    /// Take the lock, or `Ok(None)` if another export holds it.
    pub fn acquire_at(home: &Path) -> Result<Option<Self>, SyncError> {
        layout::ensure_root(home)?;
        let path = layout::lock_path(home);
        remove_if_stale(&path)?;
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        // Owner pid, for `treesync status`.
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            let _ = std::fs::remove_file(&path);
            return Err(io_err(&path, e));
        }
        tracing::debug!("push lock acquired: {}", path.display());
        Ok(Some(Self { path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PushLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("push lock released: {}", self.path.display()),
            Err(e) => tracing::warn!("could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// `true` while a running export holds the lock file.
pub fn is_held_at(home: &Path) -> bool {
    let path = layout::lock_path(home);
    path.exists() && !is_stale(&path)
}

/// Pid of the running export holding the lock.
pub fn holder_pid_at(home: &Path) -> Option<u32> {
    read_pid(&layout::lock_path(home)).filter(|pid| process_alive(*pid))
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// A lock is stale when it names a pid that is not running. A lock without a
/// readable pid may be mid-acquire and is never stale.
fn is_stale(path: &Path) -> bool {
    read_pid(path).is_some_and(|pid| !process_alive(pid))
}

fn remove_if_stale(path: &Path) -> Result<(), SyncError> {
    let Some(pid) = read_pid(path) else {
        return Ok(());
    };
    if process_alive(pid) {
        return Ok(());
    }
    tracing::warn!(
        "removing stale push lock {} left by pid {}",
        path.display(),
        pid
    );
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Exports are refused when credentials are missing, the repository is
/// unset, or another export holds the lock.
pub fn locked(home: &Path, config: &SiteConfig) -> bool {
    config.missing_credentials() || is_held_at(home)
}
