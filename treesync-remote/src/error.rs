//! Error types for treesync-remote.

use std::path::PathBuf;

use thiserror::Error;

use treesync_core::CoreError;

/// All errors an object store operation can report.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The API answered with a non-success status.
    #[error("remote returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body or blob payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An object referenced by hash does not exist in the store.
    #[error("{kind} {hash} not found")]
    NotFound { kind: &'static str, hash: String },

    /// Injected failure from the in-memory store (tests and dry runs).
    #[error("injected failure in {0}")]
    Injected(&'static str),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or local storage problem.
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
