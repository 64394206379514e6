//! # treesync-remote
//!
//! Content-addressed tree store access.
//!
//! - [`store`]: the [`ObjectStore`] trait plus [`EncodedBlob`] and [`TreeItem`]
//! - [`github`]: [`GitHubClient`], the git-data REST implementation
//! - [`memory`]: [`MemoryObjectStore`], sha256-addressed, with failure injection
//! - [`file`]: [`FileObjectStore`], the memory store persisted to `remote.json`
//! - [`error`]: [`RemoteError`]

use std::path::Path;

use treesync_core::{Backend, SiteConfig};

pub mod error;
pub mod file;
pub mod github;
pub mod memory;
pub mod store;

pub use error::RemoteError;
pub use file::FileObjectStore;
pub use github::GitHubClient;
pub use memory::{MemoryObjectStore, Operation};
pub use store::{EncodedBlob, ObjectStore, TreeItem};

/// The object store selected by `config.backend`.
pub fn open_store(home: &Path, config: &SiteConfig) -> Result<Box<dyn ObjectStore>, RemoteError> {
    match config.backend {
        Backend::Github => Ok(Box::new(GitHubClient::from_config(config)?)),
        Backend::Local => Ok(Box::new(FileObjectStore::open_at(home)?)),
    }
}
