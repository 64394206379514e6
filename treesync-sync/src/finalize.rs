//! Export finalizer and hash write-back.
//!
//! Given a reconciled [`WorkingTree`]:
//!
//! 1. Not dirty: nothing to push.
//! 2. `create_tree` with every blob.
//! 3. `get_tree_recursive` on the new tree, then write each touched post's
//!    new blob hash back onto the post.
//! 4. `create_commit` with a self-authored message.
//! 5. `set_ref` to move the branch.
//!
//! Any remote failure ends the export with [`ExportOutcome::Errored`] and is
//! recorded in the returned [`SyncState`]. Nothing is rolled back: a failed
//! commit leaves an orphan tree, a failed ref update an orphan commit.

use std::fmt;

use treesync_core::types::{Commit, PostId, SyncState, TreeHash, TreeSnapshot, SELF_AUTHORED_MARKER};
use treesync_core::PostStore;
use treesync_remote::ObjectStore;

use crate::reconcile::{SkippedPost, TouchedPost, WorkingTree};

/// Remote step an export failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStep {
    ReadHead,
    CreateTree,
    FetchTree,
    CreateCommit,
    SetRef,
}

impl fmt::Display for ExportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportStep::ReadHead => "read head",
            ExportStep::CreateTree => "create tree",
            ExportStep::FetchTree => "fetch tree",
            ExportStep::CreateCommit => "create commit",
            ExportStep::SetRef => "set ref",
        })
    }
}

/// Posts whose hashes were (or could not be) written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBackReport {
    pub updated: Vec<PostId>,
    pub unmatched: Vec<PostId>,
    /// Left out of the commit because they failed to render.
    pub skipped: Vec<SkippedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Working tree was clean; no remote writes.
    NoChange,
    Committed {
        tree: TreeHash,
        commit: Commit,
        write_back: WriteBackReport,
    },
    Errored {
        step: ExportStep,
        message: String,
    },
    /// Refused: lock held, credentials missing or repository unset.
    Locked,
}

impl ExportOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ExportOutcome::Committed { .. })
    }
}

/// `"<summary> - treesync"`.
pub fn commit_message(summary: &str) -> String {
    format!("{summary} {SELF_AUTHORED_MARKER}")
}

/// Push `tree` as one commit. `full` marks a full export in the state.
pub fn finalize<S, P>(
    tree: WorkingTree,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
    message: &str,
    full: bool,
) -> (ExportOutcome, SyncState)
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let (blobs, dirty, touched, skipped) = tree.into_parts();
    if !dirty {
        tracing::info!("working tree clean; nothing to export");
        return (ExportOutcome::NoChange, state.record_no_change());
    }

    let errored = |state: SyncState, step: ExportStep, e: &dyn fmt::Display| {
        let message = format!("{step} failed: {e}");
        tracing::error!("export aborted: {message}");
        (
            ExportOutcome::Errored {
                step,
                message: message.clone(),
            },
            state.record_error(message),
        )
    };

    let tree_hash = match remote.create_tree(&blobs) {
        Ok(h) => h,
        Err(e) => return errored(state, ExportStep::CreateTree, &e),
    };
    tracing::debug!("created tree {tree_hash} with {} blobs", blobs.len());

    let snapshot = match remote.get_tree_recursive(&tree_hash) {
        Ok(s) => s,
        Err(e) => return errored(state, ExportStep::FetchTree, &e),
    };
    let mut write_back = write_back(&snapshot, &touched, posts);
    write_back.skipped = skipped;

    let commit = match remote.create_commit(&tree_hash, message) {
        Ok(c) => c,
        Err(e) => return errored(state, ExportStep::CreateCommit, &e),
    };
    if let Err(e) = remote.set_ref(&commit.hash) {
        return errored(state, ExportStep::SetRef, &e);
    }

    tracing::info!(
        "exported commit {} ({} posts updated)",
        commit.hash,
        write_back.updated.len()
    );
    (
        ExportOutcome::Committed {
            tree: tree_hash,
            commit,
            write_back,
        },
        state.record_export(full),
    )
}

/// Record on each touched post the hash of the snapshot blob at its export
/// path. Posts with no matching blob are left unchanged.
pub fn write_back<P>(snapshot: &TreeSnapshot, touched: &[TouchedPost], posts: &mut P) -> WriteBackReport
where
    P: PostStore + ?Sized,
{
    let mut report = WriteBackReport::default();
    for t in touched {
        let Some(hash) = snapshot.blob_at(&t.path).and_then(|e| e.blob_hash()) else {
            tracing::warn!("post {}: no hash matched at {}", t.id, t.path);
            report.unmatched.push(t.id);
            continue;
        };
        match posts.set_content_hash(t.id, hash, &t.path) {
            Ok(true) => report.updated.push(t.id),
            Ok(false) => {
                tracing::warn!("post {}: deleted before its hash could be recorded", t.id);
                report.unmatched.push(t.id);
            }
            Err(e) => {
                tracing::warn!("post {}: could not record hash: {}", t.id, e);
                report.unmatched.push(t.id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_content::PostRenderer;
    use treesync_core::types::{Post, TreeEntry};
    use treesync_core::MemoryPostStore;
    use treesync_remote::{MemoryObjectStore, Operation};

    fn dirty_tree(posts: &MemoryPostStore, remote: &MemoryObjectStore) -> WorkingTree {
        let renderer = PostRenderer::with_defaults().unwrap();
        let mut tree = WorkingTree::default();
        for post in posts.list().unwrap() {
            tree.reconcile(&post, false, &renderer, remote).unwrap();
        }
        tree
    }

    #[test]
    fn clean_tree_makes_no_remote_calls() {
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::new();
        let (outcome, state) = finalize(
            WorkingTree::default(),
            &mut remote,
            &mut posts,
            SyncState::default(),
            "m",
            true,
        );
        assert_eq!(outcome, ExportOutcome::NoChange);
        assert!(state.export_complete);
        assert!(!state.fully_exported);
        assert_eq!(remote.calls().create_tree.get(), 0);
    }

    #[test]
    fn commit_writes_back_hashes() {
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(1), "Hello", "body")]);
        let tree = dirty_tree(&posts, &remote);

        let (outcome, state) = finalize(
            tree,
            &mut remote,
            &mut posts,
            SyncState::default(),
            &commit_message("Full export"),
            true,
        );
        let ExportOutcome::Committed { commit, write_back, .. } = outcome else {
            panic!("expected commit, got {outcome:?}");
        };
        assert!(commit.message.ends_with(SELF_AUTHORED_MARKER));
        assert_eq!(write_back.updated, vec![PostId(1)]);
        assert!(state.fully_exported);
        assert!(state.last_error.is_none());

        let post = posts.get(PostId(1)).unwrap().unwrap();
        let snapshot = remote.head_snapshot().unwrap();
        let path = post.remote_path.clone().unwrap();
        assert_eq!(
            snapshot.blob_at(&path).and_then(|e| e.blob_hash()),
            post.content_hash
        );
    }

    #[test]
    fn failure_is_recorded_not_raised() {
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(1), "Hello", "body")]);
        let tree = dirty_tree(&posts, &remote);
        remote.fail_on(Operation::SetRef);

        let (outcome, state) = finalize(tree, &mut remote, &mut posts, SyncState::default(), "m", true);
        assert!(matches!(
            outcome,
            ExportOutcome::Errored {
                step: ExportStep::SetRef,
                ..
            }
        ));
        assert!(state.last_error.as_deref().unwrap().contains("set ref"));
        assert!(!state.export_complete);
        assert!(remote.head().is_none());
    }

    #[test]
    fn unmatched_path_leaves_post_unchanged() {
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(4), "x", "y")]);
        let snapshot = TreeSnapshot {
            hash: None,
            entries: vec![TreeEntry::blob("elsewhere.md", "h")],
        };
        let touched = [TouchedPost {
            id: PostId(4),
            path: "_posts/x.md".into(),
        }];
        let report = write_back(&snapshot, &touched, &mut posts);
        assert_eq!(report.unmatched, vec![PostId(4)]);
        assert!(posts.get(PostId(4)).unwrap().unwrap().content_hash.is_none());
    }
}
