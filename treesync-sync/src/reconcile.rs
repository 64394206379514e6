//! Working tree and the per-post reconcile step.
//!
//! A [`WorkingTree`] is seeded from the last known remote snapshot and then
//! reconciled one post at a time:
//!
//! 1. Find the blob whose hash equals the post's last-known hash. Pending
//!    blobs have no hash and never match; paths are never compared.
//! 2. Found, keeping: remove it and append the replacement from the blob
//!    builder.
//! 3. Found, removing: remove it and mark the tree dirty.
//! 4. Not found, keeping: append a new pending blob and mark dirty.
//! 5. Not found, removing: nothing was ever exported, nothing to do.

use treesync_content::{ExportedPost, PostRenderer};
use treesync_core::types::{Blob, Post, PostId, TreeSnapshot};
use treesync_remote::ObjectStore;

use crate::error::SyncError;

/// What reconciling one post did to the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobChange {
    /// New pending blob appended.
    Created,
    /// Existing blob replaced; at least one flag is set.
    Updated {
        path_changed: bool,
        content_changed: bool,
    },
    /// Existing blob reused verbatim.
    Unchanged,
    /// Existing blob dropped.
    Removed,
    /// Removal of a post that was never exported.
    Skipped,
}

impl BlobChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, BlobChange::Unchanged | BlobChange::Skipped)
    }
}

/// A post reconciled in this batch, with the path its blob was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedPost {
    pub id: PostId,
    pub path: String,
}

/// A post left out of the batch because it could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPost {
    pub id: PostId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTree {
    blobs: Vec<Blob>,
    dirty: bool,
    touched: Vec<TouchedPost>,
    skipped: Vec<SkippedPost>,
}

impl WorkingTree {
    /// Tree holding every blob entry of `snapshot`; directory entries and
    /// transport fields are dropped.
    pub fn from_snapshot(snapshot: &TreeSnapshot) -> Self {
        Self {
            blobs: snapshot.blobs().filter_map(Blob::from_entry).collect(),
            dirty: false,
            touched: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn touched(&self) -> &[TouchedPost] {
        &self.touched
    }

    pub fn skipped(&self) -> &[SkippedPost] {
        &self.skipped
    }

    /// Leave `id` out of this batch. Its blob, if any, stays as it was.
    pub fn skip(&mut self, id: PostId, reason: impl Into<String>) {
        self.skipped.push(SkippedPost {
            id,
            reason: reason.into(),
        });
    }

    /// Reconcile `post` into the tree. A rendering error leaves the tree
    /// untouched; remote fetch errors are logged and treated as changed
    /// content.
    pub fn reconcile<S>(
        &mut self,
        post: &Post,
        removing: bool,
        renderer: &PostRenderer,
        remote: &S,
    ) -> Result<BlobChange, SyncError>
    where
        S: ObjectStore + ?Sized,
    {
        let found = post.content_hash.as_ref().and_then(|hash| {
            self.blobs
                .iter()
                .position(|b| b.hash() == Some(hash))
        });

        let change = match (found, removing) {
            (Some(i), false) => {
                let exported = renderer.export(post)?;
                let existing = self.blobs.remove(i);
                let (blob, change) = build_blob(existing, &exported, remote);
                if change.is_change() {
                    self.dirty = true;
                }
                self.push(blob, post.id);
                change
            }
            (Some(i), true) => {
                let removed = self.blobs.remove(i);
                tracing::debug!("post {}: removing {}", post.id, removed.path());
                self.dirty = true;
                BlobChange::Removed
            }
            (None, false) => {
                let exported = renderer.export(post)?;
                tracing::debug!("post {}: new blob at {}", post.id, exported.path);
                self.push(
                    Blob::Pending {
                        path: exported.path,
                        content: exported.content,
                    },
                    post.id,
                );
                self.dirty = true;
                BlobChange::Created
            }
            (None, true) => {
                tracing::debug!("post {}: never exported, nothing to remove", post.id);
                BlobChange::Skipped
            }
        };
        Ok(change)
    }

    fn push(&mut self, blob: Blob, id: PostId) {
        self.touched.push(TouchedPost {
            id,
            path: blob.path().to_string(),
        });
        self.blobs.push(blob);
    }

    pub(crate) fn into_parts(self) -> (Vec<Blob>, bool, Vec<TouchedPost>, Vec<SkippedPost>) {
        (self.blobs, self.dirty, self.touched, self.skipped)
    }
}

/// Blob builder: the replacement for a matched blob.
///
/// The stored path is moved to the export path when they differ. The remote
/// content is fetched and compared byte-for-byte with the export content; a
/// difference turns the blob pending with the new content. A failed fetch
/// counts as a difference.
pub fn build_blob<S>(existing: Blob, exported: &ExportedPost, remote: &S) -> (Blob, BlobChange)
where
    S: ObjectStore + ?Sized,
{
    let Blob::Existing {
        path,
        content,
        hash,
    } = existing
    else {
        return (
            Blob::Pending {
                path: exported.path.clone(),
                content: exported.content.clone(),
            },
            BlobChange::Created,
        );
    };

    let path_changed = path != exported.path;
    if path_changed {
        tracing::debug!("post {}: path {} -> {}", exported.id, path, exported.path);
    }

    let remote_content = match content {
        Some(c) => Some(c),
        None => match remote.get_blob(&hash).and_then(|b| b.decode_utf8()) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(
                    "post {}: could not fetch blob {}: {}; re-uploading content",
                    exported.id,
                    hash,
                    e
                );
                None
            }
        },
    };
    let content_changed = remote_content.as_deref() != Some(exported.content.as_str());

    if content_changed {
        return (
            Blob::Pending {
                path: exported.path.clone(),
                content: exported.content.clone(),
            },
            BlobChange::Updated {
                path_changed,
                content_changed,
            },
        );
    }

    let blob = Blob::Existing {
        path: exported.path.clone(),
        content: remote_content,
        hash,
    };
    if path_changed {
        (
            blob,
            BlobChange::Updated {
                path_changed,
                content_changed,
            },
        )
    } else {
        (blob, BlobChange::Unchanged)
    }
}
