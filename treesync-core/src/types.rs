//! Domain types shared by every treesync crate.
//!
//! Posts are the local, editable side; blobs, tree snapshots and commits model
//! the content-addressed remote side. All persisted types round-trip through
//! serde (YAML for posts, JSON for wire payloads and state).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File mode used for every blob the core writes.
pub const BLOB_MODE: &str = "100644";

/// Suffix appended to every commit message the exporter writes. The import
/// walker ignores commits carrying it so an export is never re-imported.
pub const SELF_AUTHORED_MARKER: &str = "- treesync";

/// Paths starting with this (case-insensitive) are never imported.
pub const README_PREFIX: &str = "readme";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Store-assigned, stable post identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PostId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

macro_rules! hash_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

hash_newtype!(
    /// Content hash of a blob, assigned by the object store.
    BlobHash
);
hash_newtype!(
    /// Hash of a tree object.
    TreeHash
);
hash_newtype!(
    /// Hash of a commit object.
    CommitHash
);

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// Kind of post; selects the export path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostType {
    #[default]
    Post,
    Page,
    Custom(String),
}

impl PostType {
    pub fn as_str(&self) -> &str {
        match self {
            PostType::Post => "post",
            PostType::Page => "page",
            PostType::Custom(name) => name,
        }
    }
}

impl From<String> for PostType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "post" | "" => PostType::Post,
            "page" => PostType::Page,
            _ => PostType::Custom(s),
        }
    }
}

impl From<&str> for PostType {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<PostType> for String {
    fn from(t: PostType) -> Self {
        t.as_str().to_owned()
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Publish,
    Draft,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStatus::Publish => write!(f, "publish"),
            PostStatus::Draft => write!(f, "draft"),
        }
    }
}

/// A single editable post in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub post_type: PostType,
    #[serde(default)]
    pub status: PostStatus,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Extra front-matter keys carried through export and import untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub body: String,
    /// Hash of the remote blob this post was last exported to or imported from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<BlobHash>,
    /// Remote path the hash was recorded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

impl Post {
    /// New published post dated now, with a slug derived from the title.
    pub fn new(id: PostId, title: impl Into<String>, body: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id,
            slug: slugify(&title),
            title,
            post_type: PostType::Post,
            status: PostStatus::Publish,
            date: Utc::now(),
            categories: vec![],
            tags: vec![],
            permalink: None,
            meta: BTreeMap::new(),
            body: body.into(),
            content_hash: None,
            remote_path: None,
        }
    }
}

/// Lowercase ASCII slug: alphanumerics kept, every other run becomes one `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// ---------------------------------------------------------------------------
// Remote tree model
// ---------------------------------------------------------------------------

/// Object type tag of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a recursive tree listing, as delivered by the object store.
///
/// `size` and `url` are transport details and never survive into a [`Blob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "sha")]
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE.to_string(),
            kind: EntryKind::Blob,
            hash: hash.into(),
            size: None,
            url: None,
        }
    }

    /// The entry hash as a blob hash, if this is a blob entry.
    pub fn blob_hash(&self) -> Option<BlobHash> {
        (self.kind == EntryKind::Blob).then(|| BlobHash(self.hash.clone()))
    }
}

/// Full recursive listing of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub hash: Option<TreeHash>,
    pub entries: Vec<TreeEntry>,
}

impl TreeSnapshot {
    /// Snapshot of a branch that has no commits yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Blob)
    }

    /// The blob entry at exactly `path`.
    pub fn blob_at(&self, path: &str) -> Option<&TreeEntry> {
        self.blobs().find(|e| e.path == path)
    }
}

/// A blob staged in the working tree.
///
/// `Pending` blobs have no hash yet; the object store mints one when the tree
/// is created. `Existing` blobs are carried over by hash and only hold content
/// once it has been fetched for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    Pending {
        path: String,
        content: String,
    },
    Existing {
        path: String,
        content: Option<String>,
        hash: BlobHash,
    },
}

impl Blob {
    /// Blob reused from a snapshot entry; `None` for non-blob entries.
    pub fn from_entry(entry: &TreeEntry) -> Option<Self> {
        entry.blob_hash().map(|hash| Blob::Existing {
            path: entry.path.clone(),
            content: None,
            hash,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            Blob::Pending { path, .. } | Blob::Existing { path, .. } => path,
        }
    }

    pub fn hash(&self) -> Option<&BlobHash> {
        match self {
            Blob::Pending { .. } => None,
            Blob::Existing { hash, .. } => Some(hash),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Blob::Pending { content, .. } => Some(content),
            Blob::Existing { content, .. } => content.as_deref(),
        }
    }

    pub fn set_path(&mut self, new_path: String) {
        match self {
            Blob::Pending { path, .. } | Blob::Existing { path, .. } => *path = new_path,
        }
    }
}

/// A commit as reported by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub message: String,
    pub tree: TreeHash,
    #[serde(default)]
    pub parents: Vec<CommitHash>,
}

/// `true` when `message` ends with [`SELF_AUTHORED_MARKER`].
pub fn is_self_authored(message: &str) -> bool {
    message.trim_end().ends_with(SELF_AUTHORED_MARKER)
}

// ---------------------------------------------------------------------------
// Inbound change notification
// ---------------------------------------------------------------------------

/// Push notification for one branch update. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub repository: NotificationRepository,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    #[serde(default)]
    pub commits: Vec<NotificationCommit>,
}

impl ChangeNotification {
    /// Last segment of `ref` (`refs/heads/main` → `main`).
    pub fn branch(&self) -> &str {
        self.git_ref.rsplit('/').next().unwrap_or_default()
    }

    /// Every removed path across all commits, deduplicated.
    pub fn removed_paths(&self) -> BTreeSet<String> {
        self.commits
            .iter()
            .flat_map(|c| c.removed.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRepository {
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCommit {
    pub id: CommitHash,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationCommit {
    #[serde(default)]
    pub id: Option<CommitHash>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Outcome flags of the last export/import, threaded through each operation
/// and persisted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub export_complete: bool,
    #[serde(default)]
    pub fully_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Export found nothing to commit.
    pub fn record_no_change(mut self) -> Self {
        self.export_complete = true;
        self.last_status = Some("no changes".to_string());
        self.touch()
    }

    /// Export committed and moved the branch.
    pub fn record_export(mut self, full: bool) -> Self {
        self.export_complete = true;
        if full {
            self.fully_exported = true;
        }
        self.last_error = None;
        self.last_status = Some("exported".to_string());
        self.touch()
    }

    /// Import finished (successfully or skipped) with `status`.
    pub fn record_import(mut self, status: impl Into<String>) -> Self {
        self.last_error = None;
        self.last_status = Some(status.into());
        self.touch()
    }

    pub fn record_error(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.last_status = Some("error".to_string());
        self.last_error = Some(message);
        self.touch()
    }

    fn touch(mut self) -> Self {
        self.updated_at = Some(Utc::now());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
