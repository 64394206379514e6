//! Persisted [`SyncState`] at `<home>/.treesync/state.json`.
//!
//! Writes use the same atomic `.tmp` + rename pattern as the config and post
//! files.

use std::path::{Path, PathBuf};

use treesync_core::{layout, SyncState};

use crate::error::{io_err, SyncError};

pub fn state_path_at(home: &Path) -> PathBuf {
    layout::state_path(home)
}

/// Load the state; a missing file is the default (nothing exported yet).
pub fn load_at(home: &Path) -> Result<SyncState, SyncError> {
    let path = state_path_at(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SyncState::default()),
        Err(e) => return Err(io_err(&path, e)),
    };
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_at(home: &Path, state: &SyncState) -> Result<(), SyncError> {
    layout::ensure_root(home)?;
    let json = serde_json::to_string_pretty(state)?;
    layout::write_atomic(&state_path_at(home), json.as_bytes())?;
    Ok(())
}
