//! Error types for treesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use treesync_content::ContentError;
use treesync_core::{CoreError, PostId};
use treesync_remote::RemoteError;

/// Errors that abort a sync call outright.
///
/// Remote failures during an export or import are reported through the
/// outcome and [`SyncState`](treesync_core::SyncState) instead; only local
/// problems (configuration, post storage, rendering) surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("content error: {0}")]
    Content(#[from] ContentError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("post {0} not found")]
    PostNotFound(PostId),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
