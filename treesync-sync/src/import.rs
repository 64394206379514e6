//! Import walker: remote commits → local posts.
//!
//! A change notification is validated against the site config, then the
//! head commit's tree is walked and every blob that looks like an exported
//! document is upserted as a post. Paths removed by any commit in the
//! notification are resolved to posts and deleted.

use std::collections::BTreeSet;

use treesync_content::{front_matter, import as doc, PostRenderer};
use treesync_core::types::{
    is_self_authored, BlobHash, ChangeNotification, CommitHash, Post, PostId, SyncState,
    TreeEntry, README_PREFIX,
};
use treesync_core::{PostStore, SiteConfig};
use treesync_remote::ObjectStore;

use crate::error::SyncError;

/// Why a tree entry was not imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Readme,
    /// A local post already carries this blob hash.
    KnownHash(PostId),
    NoFrontMatter,
    /// The blob could not be fetched from the remote.
    FetchFailed(String),
    Undecodable(String),
    InvalidFrontMatter(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub commit: Option<CommitHash>,
    pub imported: Vec<PostId>,
    pub skipped: Vec<(String, SkipReason)>,
    pub deleted: Vec<PostId>,
    /// Removed paths that matched no local post.
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Head commit was written by this tool; nothing to do.
    SelfAuthored,
    /// Wrong repository or branch.
    Rejected { reason: String },
    Imported(ImportReport),
    Errored { message: String },
}

/// Check repository (case-insensitive) and tracked branch.
pub fn validate(notification: &ChangeNotification, config: &SiteConfig) -> Result<(), String> {
    if !config.matches_repository(&notification.repository.full_name) {
        return Err(format!(
            "notification is for '{}', not '{}'",
            notification.repository.full_name, config.repository
        ));
    }
    if notification.branch() != config.branch {
        return Err(format!(
            "push to branch '{}' ignored; tracking '{}'",
            notification.branch(),
            config.branch
        ));
    }
    Ok(())
}

/// `true` when the first six characters of `path` spell `readme` in any case.
pub fn is_readme(path: &str) -> bool {
    path.get(..README_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(README_PREFIX))
}

/// Validate and apply `notification`. Never fails: errors end up in the
/// outcome and in the returned state.
pub fn apply_notification<S, P>(
    notification: &ChangeNotification,
    config: &SiteConfig,
    remote: &S,
    posts: &mut P,
    renderer: &PostRenderer,
    state: SyncState,
) -> (ImportOutcome, SyncState)
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    if let Err(reason) = validate(notification, config) {
        tracing::info!("import rejected: {reason}");
        return (ImportOutcome::Rejected { reason }, state);
    }

    let Some(head) = &notification.head_commit else {
        tracing::info!("notification has no head commit; nothing to import");
        return (
            ImportOutcome::Imported(ImportReport::default()),
            state.record_import("nothing to import"),
        );
    };
    if is_self_authored(&head.message) {
        tracing::debug!("head commit {} is self-authored; skipping", head.id);
        return (ImportOutcome::SelfAuthored, state);
    }

    let result = match import_commit(&head.id, config, remote, posts, renderer) {
        Ok(mut report) => {
            apply_removals(&notification.removed_paths(), posts, renderer, &mut report)
                .map(|()| report)
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(report) => {
            tracing::info!(
                "imported commit {}: {} posts, {} deleted, {} skipped",
                head.id,
                report.imported.len(),
                report.deleted.len(),
                report.skipped.len()
            );
            let status = format!("imported {}", head.id);
            (ImportOutcome::Imported(report), state.record_import(status))
        }
        Err(e) => {
            let message = format!("import of {} failed: {e}", head.id);
            tracing::error!("{message}");
            (
                ImportOutcome::Errored {
                    message: message.clone(),
                },
                state.record_error(message),
            )
        }
    }
}

/// Upsert every importable blob in the tree of commit `id`.
pub fn import_commit<S, P>(
    id: &CommitHash,
    config: &SiteConfig,
    remote: &S,
    posts: &mut P,
    renderer: &PostRenderer,
) -> Result<ImportReport, SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let commit = remote.get_commit(id)?;
    let snapshot = remote.get_tree_recursive(&commit.tree)?;
    let mut report = ImportReport {
        commit: Some(commit.hash.clone()),
        ..Default::default()
    };

    for entry in snapshot.blobs() {
        match import_entry(entry, config, remote, posts, renderer)? {
            Ok(id) => report.imported.push(id),
            Err(reason) => {
                tracing::debug!("skipping {}: {:?}", entry.path, reason);
                report.skipped.push((entry.path.clone(), reason));
            }
        }
    }
    Ok(report)
}

/// Outer error aborts the import; inner error skips this entry. Remote
/// fetch failures only skip the entry.
fn import_entry<S, P>(
    entry: &TreeEntry,
    config: &SiteConfig,
    remote: &S,
    posts: &mut P,
    renderer: &PostRenderer,
) -> Result<Result<PostId, SkipReason>, SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    if is_readme(&entry.path) {
        return Ok(Err(SkipReason::Readme));
    }
    let hash = BlobHash(entry.hash.clone());
    if let Some(known) = posts.find_by_hash(&hash)? {
        return Ok(Err(SkipReason::KnownHash(known.id)));
    }

    let blob = match remote.get_blob(&hash) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("{}: could not fetch blob {}: {}", entry.path, hash, e);
            return Ok(Err(SkipReason::FetchFailed(e.to_string())));
        }
    };
    let content = match blob.decode_utf8() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("{}: {}", entry.path, e);
            return Ok(Err(SkipReason::Undecodable(e.to_string())));
        }
    };
    if !front_matter::has_front_matter(&content) {
        return Ok(Err(SkipReason::NoFrontMatter));
    }
    let document = match front_matter::parse(&content) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("{}: invalid front matter: {}", entry.path, e);
            return Ok(Err(SkipReason::InvalidFrontMatter(e.to_string())));
        }
    };
    let Some(fm) = document.front_matter else {
        return Ok(Err(SkipReason::NoFrontMatter));
    };

    let base = base_post(doc::front_matter_id(&fm), &entry.path, posts, renderer)?;
    let mut post = doc::apply_document(base, &fm, &document.body, &entry.path, hash);
    if let Some(permalink) = post.permalink.take() {
        post.permalink = Some(
            doc::site_relative_permalink(&permalink, &config.site_url).unwrap_or(permalink),
        );
    }
    posts.save(&post)?;
    tracing::debug!("imported {} as post {}", entry.path, post.id);
    Ok(Ok(post.id))
}

/// The post an imported document updates: by front-matter id, then by the
/// path it was last seen at, else a fresh post.
fn base_post<P>(
    id: Option<PostId>,
    path: &str,
    posts: &P,
    renderer: &PostRenderer,
) -> Result<Post, SyncError>
where
    P: PostStore + ?Sized,
{
    if let Some(id) = id {
        return Ok(posts
            .get(id)?
            .unwrap_or_else(|| Post::new(id, "", "")));
    }
    if let Some(post) = posts.find_by_remote_path(path)? {
        return Ok(post);
    }
    if let Some(post) = find_by_export_path(path, posts, renderer)? {
        return Ok(post);
    }
    Ok(Post::new(posts.allocate_id()?, "", ""))
}

fn find_by_export_path<P>(
    path: &str,
    posts: &P,
    renderer: &PostRenderer,
) -> Result<Option<Post>, SyncError>
where
    P: PostStore + ?Sized,
{
    for post in posts.list()? {
        if renderer.export_path(&post)? == path {
            return Ok(Some(post));
        }
    }
    Ok(None)
}

/// Delete the posts behind `removed` paths. Each path is resolved by the
/// remote path recorded on the post, then by the post's current export path.
pub fn apply_removals<P>(
    removed: &BTreeSet<String>,
    posts: &mut P,
    renderer: &PostRenderer,
    report: &mut ImportReport,
) -> Result<(), SyncError>
where
    P: PostStore + ?Sized,
{
    for path in removed {
        let found = match posts.find_by_remote_path(path)? {
            Some(p) => Some(p),
            None => find_by_export_path(path, posts, renderer)?,
        };
        match found {
            Some(post) => {
                if posts.delete(post.id)? {
                    tracing::info!("deleted post {} (removed {})", post.id, path);
                    report.deleted.push(post.id);
                }
            }
            None => {
                tracing::warn!("removed path {path} matches no post");
                report.unresolved.push(path.clone());
            }
        }
    }
    Ok(())
}
