//! # treesync-sync
//!
//! Tree reconciliation between local posts and the remote tree store.
//!
//! Call [`run_export`] to push local posts as one commit, or [`run_import`]
//! to apply a change notification. The generic functions in [`pipeline`]
//! take their collaborators explicitly.

pub mod diff;
pub mod error;
pub mod finalize;
pub mod import;
pub mod lock;
pub mod pipeline;
pub mod reconcile;
pub mod state;

pub use diff::{diff_export, PostDiff};
pub use error::SyncError;
pub use finalize::{commit_message, ExportOutcome, ExportStep, WriteBackReport};
pub use import::{ImportOutcome, ImportReport, SkipReason};
pub use lock::PushLock;
pub use pipeline::{
    delete_post, export_all, export_post, remove_post, run_export, run_import, ExportContext,
    ExportScope,
};
pub use reconcile::{BlobChange, SkippedPost, WorkingTree};
