//! On-disk layout under `<home>/.treesync/`.
//!
//! ```text
//! ~/.treesync/
//!   config.yaml        site configuration (mode 0600)
//!   posts/<id>.yaml    one file per post (mode 0600)
//!   state.json         last export/import outcome
//!   push.lock          present while an export holds the push lock
//!   remote.json        object store for the `local` backend
//!   daemon.sock        daemon control socket
//! ```

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

pub fn root(home: &Path) -> PathBuf {
    home.join(".treesync")
}

pub fn posts_dir(home: &Path) -> PathBuf {
    root(home).join("posts")
}

pub fn state_path(home: &Path) -> PathBuf {
    root(home).join("state.json")
}

pub fn lock_path(home: &Path) -> PathBuf {
    root(home).join("push.lock")
}

pub fn remote_store_path(home: &Path) -> PathBuf {
    root(home).join("remote.json")
}

pub fn socket_path(home: &Path) -> PathBuf {
    root(home).join("daemon.sock")
}

/// `dirs::home_dir()` or [`CoreError::HomeNotFound`].
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

/// Create `<home>/.treesync/` (mode `0700`) if absent.
pub fn ensure_root(home: &Path) -> Result<PathBuf, CoreError> {
    ensure_dir(&root(home))
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<PathBuf, CoreError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Serialize-then-rename write: `<path>.tmp` sibling → `chmod 0600` → `rename`.
///
/// The `.tmp` file lives next to the target so the rename never crosses
/// filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}
