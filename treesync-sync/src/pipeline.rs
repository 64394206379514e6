//! Export and import entry points.
//!
//! The generic functions take every collaborator explicitly and are what the
//! tests drive. [`run_export`] and [`run_import`] are the canonical
//! entry points for the CLI and the daemon: they load the config, posts and
//! state from `home`, open the configured object store and persist the state
//! afterwards.

use std::path::Path;

use treesync_content::PostRenderer;
use treesync_core::types::{ChangeNotification, Post, PostId, SyncState};
use treesync_core::{config, FsPostStore, PostStore, SiteConfig};
use treesync_remote::{open_store, ObjectStore};

use crate::finalize::{commit_message, finalize, ExportOutcome, ExportStep};
use crate::import::{apply_notification, ImportOutcome};
use crate::lock::{self, PushLock};
use crate::reconcile::WorkingTree;
use crate::{state, SyncError};

/// What an export run covers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportScope {
    /// Every local post.
    All,
    /// One saved post.
    Post(PostId),
    /// Remove a post from the remote, then delete it locally.
    Delete(PostId),
    /// Remove an already-deleted post, given its last known state.
    Removed(Box<Post>),
}

/// Everything an export needs besides the object store and post store.
pub struct ExportContext<'a> {
    pub home: &'a Path,
    pub config: &'a SiteConfig,
    pub renderer: &'a PostRenderer,
}

impl ExportContext<'_> {
    /// Site name used in commit messages.
    pub fn site_label(&self) -> &str {
        [&self.config.site_name, &self.config.site_url, &self.config.repository]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("site")
    }
}

/// Shared export body: lock, seed from the branch tip, reconcile each post
/// in `batch`, finalize.
fn export_batch<S, P>(
    ctx: &ExportContext<'_>,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
    batch: &[(Post, bool)],
    message: &str,
    full: bool,
) -> Result<(ExportOutcome, SyncState), SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    if lock::locked(ctx.home, ctx.config) {
        tracing::info!("export skipped: push lock held or credentials missing");
        return Ok((ExportOutcome::Locked, state));
    }
    let Some(_lock) = PushLock::acquire_at(ctx.home)? else {
        return Ok((ExportOutcome::Locked, state));
    };

    let snapshot = match remote.head_snapshot() {
        Ok(s) => s,
        Err(e) => {
            let message = format!("{} failed: {e}", ExportStep::ReadHead);
            tracing::error!("export aborted: {message}");
            return Ok((
                ExportOutcome::Errored {
                    step: ExportStep::ReadHead,
                    message: message.clone(),
                },
                state.record_error(message),
            ));
        }
    };

    let mut tree = WorkingTree::from_snapshot(&snapshot);
    for (post, removing) in batch {
        match tree.reconcile(post, *removing, ctx.renderer, &*remote) {
            Ok(change) => tracing::debug!("post {}: {:?}", post.id, change),
            Err(e) => {
                tracing::warn!("post {}: skipped: {}", post.id, e);
                tree.skip(post.id, e.to_string());
            }
        }
    }
    Ok(finalize(tree, remote, posts, state, message, full))
}

/// Push every local post as one commit.
pub fn export_all<S, P>(
    ctx: &ExportContext<'_>,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
) -> Result<(ExportOutcome, SyncState), SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let batch: Vec<(Post, bool)> = posts.list()?.into_iter().map(|p| (p, false)).collect();
    let message = commit_message(&format!("Full export from treesync at {}", ctx.site_label()));
    export_batch(ctx, remote, posts, state, &batch, &message, true)
}

/// Push one post.
pub fn export_post<S, P>(
    ctx: &ExportContext<'_>,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
    id: PostId,
) -> Result<(ExportOutcome, SyncState), SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let post = posts.get(id)?.ok_or(SyncError::PostNotFound(id))?;
    let path = ctx.renderer.export_path(&post)?;
    let message = commit_message(&format!(
        "Syncing {path} from treesync at {}",
        ctx.site_label()
    ));
    export_batch(ctx, remote, posts, state, &[(post, false)], &message, false)
}

/// Remove `post` from the remote. The post itself may already be gone
/// locally.
pub fn remove_post<S, P>(
    ctx: &ExportContext<'_>,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
    post: Post,
) -> Result<(ExportOutcome, SyncState), SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let path = match &post.remote_path {
        Some(p) => p.clone(),
        None => ctx.renderer.export_path(&post)?,
    };
    let message = commit_message(&format!(
        "Deleted {path} from treesync at {}",
        ctx.site_label()
    ));
    export_batch(ctx, remote, posts, state, &[(post, true)], &message, false)
}

/// Remove a post from the remote and, once the remote no longer carries it,
/// delete it locally. A locked or failed export keeps the local post so the
/// deletion can be retried.
pub fn delete_post<S, P>(
    ctx: &ExportContext<'_>,
    remote: &mut S,
    posts: &mut P,
    state: SyncState,
    id: PostId,
) -> Result<(ExportOutcome, SyncState), SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let post = posts.get(id)?.ok_or(SyncError::PostNotFound(id))?;
    let (outcome, state) = remove_post(ctx, remote, posts, state, post)?;
    if matches!(outcome, ExportOutcome::NoChange | ExportOutcome::Committed { .. }) {
        posts.delete(id)?;
        tracing::info!("deleted local post {id}");
    }
    Ok((outcome, state))
}

/// Run one export against the configured store, persisting the state.
pub fn run_export(home: &Path, scope: ExportScope) -> Result<ExportOutcome, SyncError> {
    let config = config::load_at(home)?;
    let renderer = PostRenderer::new(&config)?;
    let mut posts = FsPostStore::open_at(home)?;
    let ctx = ExportContext {
        home,
        config: &config,
        renderer: &renderer,
    };
    if lock::locked(home, &config) {
        tracing::info!("export skipped: push lock held or credentials missing");
        return Ok(ExportOutcome::Locked);
    }
    let mut remote = open_store(home, &config)?;
    let before = state::load_at(home)?;

    let (outcome, after) = match scope {
        ExportScope::All => export_all(&ctx, &mut remote, &mut posts, before)?,
        ExportScope::Post(id) => export_post(&ctx, &mut remote, &mut posts, before, id)?,
        ExportScope::Delete(id) => delete_post(&ctx, &mut remote, &mut posts, before, id)?,
        ExportScope::Removed(post) => remove_post(&ctx, &mut remote, &mut posts, before, *post)?,
    };
    if outcome != ExportOutcome::Locked {
        state::save_at(home, &after)?;
    }
    Ok(outcome)
}

/// Apply one change notification against the configured store, persisting
/// the state.
pub fn run_import(home: &Path, notification: &ChangeNotification) -> Result<ImportOutcome, SyncError> {
    let config = config::load_at(home)?;
    let renderer = PostRenderer::new(&config)?;
    let mut posts = FsPostStore::open_at(home)?;
    let remote = open_store(home, &config)?;
    let before = state::load_at(home)?;

    let (outcome, after) = apply_notification(
        notification,
        &config,
        &remote,
        &mut posts,
        &renderer,
        before.clone(),
    );
    if after != before {
        state::save_at(home, &after)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use treesync_core::{Backend, MemoryPostStore};
    use treesync_remote::MemoryObjectStore;

    #[test]
    fn site_label_falls_back() {
        let renderer = PostRenderer::with_defaults().unwrap();
        let home = TempDir::new().unwrap();
        let mut config = SiteConfig::new("me/blog", Backend::Local);
        let ctx = ExportContext {
            home: home.path(),
            config: &config,
            renderer: &renderer,
        };
        assert_eq!(ctx.site_label(), "me/blog");

        config.site_name = "My Blog".into();
        let ctx = ExportContext {
            home: home.path(),
            config: &config,
            renderer: &renderer,
        };
        assert_eq!(ctx.site_label(), "My Blog");
    }

    #[test]
    fn held_lock_makes_export_a_silent_noop() {
        let renderer = PostRenderer::with_defaults().unwrap();
        let home = TempDir::new().unwrap();
        let config = SiteConfig::new("me/blog", Backend::Local);
        let ctx = ExportContext {
            home: home.path(),
            config: &config,
            renderer: &renderer,
        };
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(1), "a", "b")]);
        let _held = PushLock::acquire_at(home.path()).unwrap();

        let (outcome, state) =
            export_all(&ctx, &mut remote, &mut posts, SyncState::default()).unwrap();
        assert_eq!(outcome, ExportOutcome::Locked);
        assert_eq!(state, SyncState::default());
        assert_eq!(remote.calls().create_tree.get(), 0);
    }

    #[test]
    fn delete_of_unexported_post_removes_it_locally() {
        let renderer = PostRenderer::with_defaults().unwrap();
        let home = TempDir::new().unwrap();
        let config = SiteConfig::new("me/blog", Backend::Local);
        let ctx = ExportContext {
            home: home.path(),
            config: &config,
            renderer: &renderer,
        };
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(1), "a", "b")]);

        let (outcome, _) =
            delete_post(&ctx, &mut remote, &mut posts, SyncState::default(), PostId(1)).unwrap();
        assert_eq!(outcome, ExportOutcome::NoChange);
        assert!(posts.is_empty());
        assert_eq!(remote.commit_count(), 0);
    }

    #[test]
    fn missing_post_is_an_error() {
        let renderer = PostRenderer::with_defaults().unwrap();
        let home = TempDir::new().unwrap();
        let config = SiteConfig::new("me/blog", Backend::Local);
        let ctx = ExportContext {
            home: home.path(),
            config: &config,
            renderer: &renderer,
        };
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::new();
        let err = export_post(&ctx, &mut remote, &mut posts, SyncState::default(), PostId(9))
            .unwrap_err();
        assert!(matches!(err, SyncError::PostNotFound(PostId(9))));
    }
}
