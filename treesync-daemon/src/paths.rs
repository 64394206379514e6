use std::path::{Path, PathBuf};
use std::time::Duration;

use treesync_core::layout;

/// Saves to the same post file inside this window trigger one export.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Set to `json` for JSON log lines.
pub const LOG_FORMAT_ENV: &str = "TREESYNC_LOG_FORMAT";

pub fn socket_path(home: &Path) -> PathBuf {
    layout::socket_path(home)
}

pub fn posts_dir(home: &Path) -> PathBuf {
    layout::posts_dir(home)
}
