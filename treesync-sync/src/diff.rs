//! Dry-run unified diff support for `treesync diff`.

use similar::TextDiff;

use treesync_content::PostRenderer;
use treesync_core::types::{Post, TreeSnapshot};
use treesync_core::PostStore;
use treesync_remote::ObjectStore;

use crate::SyncError;

/// What an export would change for one post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDiff {
    pub post: Post,
    /// Path of the matching remote blob, `None` for a post never exported.
    pub remote_path: Option<String>,
    pub export_path: String,
    pub unified_diff: String,
}

impl PostDiff {
    pub fn is_new(&self) -> bool {
        self.remote_path.is_none()
    }

    pub fn is_move(&self) -> bool {
        self.remote_path.as_deref().is_some_and(|p| p != self.export_path)
    }
}

/// Render every post and compare it with the blob its hash points at in the
/// branch tip tree. Nothing is written anywhere.
pub fn diff_export<S, P>(
    remote: &S,
    posts: &P,
    renderer: &PostRenderer,
) -> Result<Vec<PostDiff>, SyncError>
where
    S: ObjectStore + ?Sized,
    P: PostStore + ?Sized,
{
    let snapshot = remote.head_snapshot()?;
    let mut diffs = Vec::new();
    for post in posts.list()? {
        if let Some(diff) = diff_post(&post, &snapshot, remote, renderer)? {
            diffs.push(diff);
        }
    }
    Ok(diffs)
}

fn diff_post<S>(
    post: &Post,
    snapshot: &TreeSnapshot,
    remote: &S,
    renderer: &PostRenderer,
) -> Result<Option<PostDiff>, SyncError>
where
    S: ObjectStore + ?Sized,
{
    let exported = renderer.export(post)?;
    let matched = post.content_hash.as_ref().and_then(|hash| {
        snapshot
            .blobs()
            .find(|e| e.hash == hash.0)
            .map(|e| (e.path.clone(), hash))
    });

    let (remote_path, existing) = match matched {
        Some((path, hash)) => {
            let content = remote.get_blob(hash)?.decode_utf8()?;
            (Some(path), content)
        }
        None => (None, String::new()),
    };

    if remote_path.as_deref() == Some(exported.path.as_str()) && existing == exported.content {
        return Ok(None);
    }

    let old_header = match &remote_path {
        Some(p) => format!("a/{p}"),
        None => "/dev/null".to_string(),
    };
    let new_header = format!("b/{}", exported.path);
    let unified_diff = TextDiff::from_lines(&existing, &exported.content)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(Some(PostDiff {
        post: post.clone(),
        remote_path,
        export_path: exported.path,
        unified_diff,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::types::PostId;
    use treesync_core::MemoryPostStore;
    use treesync_remote::MemoryObjectStore;

    use crate::finalize::{finalize, ExportOutcome};
    use crate::reconcile::WorkingTree;

    fn exported_store() -> (MemoryObjectStore, MemoryPostStore, PostRenderer) {
        let renderer = PostRenderer::with_defaults().unwrap();
        let mut remote = MemoryObjectStore::new();
        let mut posts = MemoryPostStore::with_posts([Post::new(PostId(1), "Hello", "line one\n")]);
        let mut tree = WorkingTree::default();
        for post in posts.list().unwrap() {
            tree.reconcile(&post, false, &renderer, &remote).unwrap();
        }
        let (outcome, _) = finalize(tree, &mut remote, &mut posts, Default::default(), "m", true);
        assert!(matches!(outcome, ExportOutcome::Committed { .. }));
        (remote, posts, renderer)
    }

    #[test]
    fn no_diffs_after_export() {
        let (remote, posts, renderer) = exported_store();
        assert!(diff_export(&remote, &posts, &renderer).unwrap().is_empty());
    }

    #[test]
    fn local_edit_produces_unified_diff() {
        let (remote, mut posts, renderer) = exported_store();
        let mut post = posts.get(PostId(1)).unwrap().unwrap();
        post.body = "line one\nline two\n".into();
        posts.save(&post).unwrap();

        let diffs = diff_export(&remote, &posts, &renderer).unwrap();
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert!(!d.is_new());
        assert!(!d.is_move());
        assert!(d.unified_diff.contains("+line two"));
        assert!(d.unified_diff.contains("@@"));
        assert!(d.unified_diff.contains(&format!("--- a/{}", d.export_path)));
    }

    #[test]
    fn new_post_diffs_against_dev_null() {
        let (remote, mut posts, renderer) = exported_store();
        posts.save(&Post::new(PostId(2), "Second", "new\n")).unwrap();

        let diffs = diff_export(&remote, &posts, &renderer).unwrap();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].is_new());
        assert!(diffs[0].unified_diff.contains("--- /dev/null"));
    }
}
