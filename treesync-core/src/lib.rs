//! treesync core library: domain types, site configuration, post storage, errors.
//!
//! - [`types`]: newtypes, posts, the remote tree model, [`SyncState`]
//! - [`config`]: [`SiteConfig`] load / save / init
//! - [`posts`]: [`PostStore`] and its filesystem and in-memory implementations
//! - [`layout`]: paths under `~/.treesync/` and the atomic write helper
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod layout;
pub mod posts;
pub mod types;

pub use config::{Backend, SiteConfig};
pub use error::CoreError;
pub use posts::{FsPostStore, MemoryPostStore, PostStore};
pub use types::{
    Blob, BlobHash, ChangeNotification, Commit, CommitHash, EntryKind, Post, PostId, PostStatus,
    PostType, SyncState, TreeEntry, TreeHash, TreeSnapshot, BLOB_MODE, SELF_AUTHORED_MARKER,
};
