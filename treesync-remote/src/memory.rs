//! In-memory object store with SHA-256 content addressing.
//!
//! Hash framing mirrors git (`blob <len>\0<bytes>`) so identical content
//! always maps to the same blob hash. Recursive listings include synthesized
//! directory entries, and blob entries carry `size`/`url` like a real API.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use treesync_core::types::{
    Blob, BlobHash, Commit, CommitHash, EntryKind, TreeEntry, TreeHash, TreeSnapshot, BLOB_MODE,
};

use crate::error::RemoteError;
use crate::store::{EncodedBlob, ObjectStore};

/// Store operation that [`MemoryObjectStore::fail_on`] can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetBlob,
    GetTree,
    CreateTree,
    CreateCommit,
    SetRef,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::GetBlob => "get_blob",
            Operation::GetTree => "get_tree_recursive",
            Operation::CreateTree => "create_tree",
            Operation::CreateCommit => "create_commit",
            Operation::SetRef => "set_ref",
        }
    }
}

/// Number of calls per operation since the store was created.
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    pub get_blob: Cell<usize>,
    pub create_tree: Cell<usize>,
    pub create_commit: Cell<usize>,
    pub set_ref: Cell<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryObjectStore {
    /// Blob hash → base64 content.
    blobs: BTreeMap<String, String>,
    /// Tree hash → blob entries (path, blob hash), sorted by path.
    trees: BTreeMap<String, Vec<(String, String)>>,
    commits: BTreeMap<String, Commit>,
    head: Option<CommitHash>,
    #[serde(skip)]
    calls: CallCounts,
    #[serde(skip)]
    failing: Option<Operation>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Make every later call of `op` fail with [`RemoteError::Injected`].
    pub fn fail_on(&mut self, op: Operation) {
        self.failing = Some(op);
    }

    pub fn clear_failure(&mut self) {
        self.failing = None;
    }

    pub fn head(&self) -> Option<&CommitHash> {
        self.head.as_ref()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Commit `files` as the complete new tree and move the branch to it,
    /// as a push from another client would.
    pub fn commit_files(
        &mut self,
        files: &[(&str, &str)],
        message: &str,
    ) -> Result<Commit, RemoteError> {
        let blobs: Vec<Blob> = files
            .iter()
            .map(|(path, content)| Blob::Pending {
                path: (*path).to_string(),
                content: (*content).to_string(),
            })
            .collect();
        let tree = self.create_tree(&blobs)?;
        let commit = self.create_commit(&tree, message)?;
        self.set_ref(&commit.hash)?;
        Ok(commit)
    }

    /// Decoded text of the blob at `path` in the branch tip tree.
    pub fn read_head_file(&self, path: &str) -> Option<String> {
        let snapshot = self.head_snapshot().ok()?;
        let hash = snapshot.blob_at(path)?.blob_hash()?;
        self.get_blob(&hash).ok()?.decode_utf8().ok()
    }

    fn check(&self, op: Operation) -> Result<(), RemoteError> {
        if self.failing == Some(op) {
            return Err(RemoteError::Injected(op.name()));
        }
        Ok(())
    }

    fn put_blob(&mut self, content: &[u8]) -> String {
        let hash = digest(&[format!("blob {}\0", content.len()).as_bytes(), content]);
        self.blobs
            .entry(hash.clone())
            .or_insert_with(|| EncodedBlob::from_bytes(content).content);
        hash
    }
}

fn digest(parts: &[&[u8]]) -> String {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    hex::encode(h.finalize())
}

/// Every directory prefix of the given paths (`a/b/c.md` → `a`, `a/b`).
fn directories<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in paths {
        let mut end = 0;
        while let Some(i) = path[end..].find('/') {
            end += i;
            dirs.insert(path[..end].to_string());
            end += 1;
        }
    }
    dirs
}

impl ObjectStore for MemoryObjectStore {
    fn get_ref(&self) -> Result<Option<CommitHash>, RemoteError> {
        Ok(self.head.clone())
    }

    fn get_commit(&self, id: &CommitHash) -> Result<Commit, RemoteError> {
        self.commits
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                kind: "commit",
                hash: id.0.clone(),
            })
    }

    fn get_tree_recursive(&self, tree: &TreeHash) -> Result<TreeSnapshot, RemoteError> {
        self.check(Operation::GetTree)?;
        let items = self.trees.get(&tree.0).ok_or_else(|| RemoteError::NotFound {
            kind: "tree",
            hash: tree.0.clone(),
        })?;

        let mut entries: Vec<TreeEntry> = directories(items.iter().map(|(p, _)| p.as_str()))
            .into_iter()
            .map(|dir| TreeEntry {
                hash: digest(&[b"tree\0", tree.0.as_bytes(), dir.as_bytes()]),
                path: dir,
                mode: "040000".to_string(),
                kind: EntryKind::Tree,
                size: None,
                url: None,
            })
            .collect();
        for (path, hash) in items {
            let size = self
                .blobs
                .get(hash)
                .map(|b| EncodedBlob { content: b.clone(), encoding: "base64".into() })
                .and_then(|b| b.decode().ok())
                .map(|bytes| bytes.len() as u64);
            entries.push(TreeEntry {
                path: path.clone(),
                mode: BLOB_MODE.to_string(),
                kind: EntryKind::Blob,
                hash: hash.clone(),
                size,
                url: Some(format!("memory://blobs/{hash}")),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(TreeSnapshot {
            hash: Some(tree.clone()),
            entries,
        })
    }

    fn get_blob(&self, hash: &BlobHash) -> Result<EncodedBlob, RemoteError> {
        self.calls.get_blob.set(self.calls.get_blob.get() + 1);
        self.check(Operation::GetBlob)?;
        self.blobs
            .get(&hash.0)
            .map(|content| EncodedBlob {
                content: content.clone(),
                encoding: "base64".to_string(),
            })
            .ok_or_else(|| RemoteError::NotFound {
                kind: "blob",
                hash: hash.0.clone(),
            })
    }

    fn create_tree(&mut self, blobs: &[Blob]) -> Result<TreeHash, RemoteError> {
        self.calls.create_tree.set(self.calls.create_tree.get() + 1);
        self.check(Operation::CreateTree)?;

        let mut items: BTreeMap<String, String> = BTreeMap::new();
        for blob in blobs {
            let hash = match blob {
                Blob::Pending { content, .. } => self.put_blob(content.as_bytes()),
                Blob::Existing { hash, .. } => {
                    if !self.blobs.contains_key(&hash.0) {
                        return Err(RemoteError::NotFound {
                            kind: "blob",
                            hash: hash.0.clone(),
                        });
                    }
                    hash.0.clone()
                }
            };
            items.insert(blob.path().to_string(), hash);
        }

        let mut framed = Vec::new();
        for (path, hash) in &items {
            framed.extend_from_slice(format!("{BLOB_MODE} blob {hash}\t{path}\n").as_bytes());
        }
        let tree_hash = digest(&[b"tree\0", &framed]);
        self.trees
            .insert(tree_hash.clone(), items.into_iter().collect());
        Ok(TreeHash(tree_hash))
    }

    fn create_commit(&mut self, tree: &TreeHash, message: &str) -> Result<Commit, RemoteError> {
        self.calls.create_commit.set(self.calls.create_commit.get() + 1);
        self.check(Operation::CreateCommit)?;
        if !self.trees.contains_key(&tree.0) {
            return Err(RemoteError::NotFound {
                kind: "tree",
                hash: tree.0.clone(),
            });
        }

        let parents: Vec<CommitHash> = self.head.iter().cloned().collect();
        let parent_line = parents
            .iter()
            .map(|p| format!("parent {p}\n"))
            .collect::<String>();
        let hash = digest(&[
            b"commit\0",
            format!("tree {tree}\n{parent_line}\n{message}").as_bytes(),
        ]);
        let commit = Commit {
            hash: CommitHash(hash.clone()),
            message: message.to_string(),
            tree: tree.clone(),
            parents,
        };
        self.commits.insert(hash, commit.clone());
        Ok(commit)
    }

    fn set_ref(&mut self, commit: &CommitHash) -> Result<(), RemoteError> {
        self.calls.set_ref.set(self.calls.set_ref.get() + 1);
        self.check(Operation::SetRef)?;
        if !self.commits.contains_key(&commit.0) {
            return Err(RemoteError::NotFound {
                kind: "commit",
                hash: commit.0.clone(),
            });
        }
        self.head = Some(commit.clone());
        Ok(())
    }
}
