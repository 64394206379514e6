//! The [`ObjectStore`] seam and the wire forms shared by its implementations.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use treesync_core::types::{
    Blob, BlobHash, Commit, CommitHash, TreeHash, TreeSnapshot, BLOB_MODE,
};

use crate::error::RemoteError;

/// Blob payload as delivered by the store: base64 text, possibly wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBlob {
    pub content: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "base64".to_string()
}

impl EncodedBlob {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            encoding: default_encoding(),
        }
    }

    /// Raw bytes. GitHub wraps base64 at 60 columns, so whitespace is dropped
    /// before decoding.
    pub fn decode(&self) -> Result<Vec<u8>, RemoteError> {
        match self.encoding.as_str() {
            "base64" => {
                let compact: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| RemoteError::Decode(format!("invalid base64 blob: {e}")))
            }
            "utf-8" | "utf8" => Ok(self.content.as_bytes().to_vec()),
            other => Err(RemoteError::Decode(format!("unsupported blob encoding '{other}'"))),
        }
    }

    /// Decoded content as UTF-8 text.
    pub fn decode_utf8(&self) -> Result<String, RemoteError> {
        String::from_utf8(self.decode()?)
            .map_err(|e| RemoteError::Decode(format!("blob is not UTF-8: {e}")))
    }
}

/// One item of a tree-creation request. Exactly one of `sha`/`content` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<&Blob> for TreeItem {
    fn from(blob: &Blob) -> Self {
        let (sha, content) = match blob {
            Blob::Pending { content, .. } => (None, Some(content.clone())),
            Blob::Existing { hash, .. } => (Some(hash.0.clone()), None),
        };
        Self {
            path: blob.path().to_string(),
            mode: BLOB_MODE.to_string(),
            kind: "blob".to_string(),
            sha,
            content,
        }
    }
}

/// Operations the sync engine needs from a content-addressed tree store.
///
/// Every call is a blocking round-trip; errors carry a human-readable message.
pub trait ObjectStore {
    /// Commit the tracked branch points at; `None` while the branch is empty.
    fn get_ref(&self) -> Result<Option<CommitHash>, RemoteError>;

    fn get_commit(&self, id: &CommitHash) -> Result<Commit, RemoteError>;

    /// Every entry of `tree`, recursively.
    fn get_tree_recursive(&self, tree: &TreeHash) -> Result<TreeSnapshot, RemoteError>;

    fn get_blob(&self, hash: &BlobHash) -> Result<EncodedBlob, RemoteError>;

    /// Create a tree holding exactly `blobs`; pending blobs get fresh hashes.
    fn create_tree(&mut self, blobs: &[Blob]) -> Result<TreeHash, RemoteError>;

    /// Commit `tree` on top of the current branch tip.
    fn create_commit(&mut self, tree: &TreeHash, message: &str) -> Result<Commit, RemoteError>;

    /// Move the tracked branch to `commit`.
    fn set_ref(&mut self, commit: &CommitHash) -> Result<(), RemoteError>;

    /// Snapshot of the tree at the branch tip (empty for an empty branch).
    fn head_snapshot(&self) -> Result<TreeSnapshot, RemoteError> {
        match self.get_ref()? {
            Some(head) => {
                let commit = self.get_commit(&head)?;
                self.get_tree_recursive(&commit.tree)
            }
            None => Ok(TreeSnapshot::empty()),
        }
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn get_ref(&self) -> Result<Option<CommitHash>, RemoteError> {
        (**self).get_ref()
    }
    fn get_commit(&self, id: &CommitHash) -> Result<Commit, RemoteError> {
        (**self).get_commit(id)
    }
    fn get_tree_recursive(&self, tree: &TreeHash) -> Result<TreeSnapshot, RemoteError> {
        (**self).get_tree_recursive(tree)
    }
    fn get_blob(&self, hash: &BlobHash) -> Result<EncodedBlob, RemoteError> {
        (**self).get_blob(hash)
    }
    fn create_tree(&mut self, blobs: &[Blob]) -> Result<TreeHash, RemoteError> {
        (**self).create_tree(blobs)
    }
    fn create_commit(&mut self, tree: &TreeHash, message: &str) -> Result<Commit, RemoteError> {
        (**self).create_commit(tree, message)
    }
    fn set_ref(&mut self, commit: &CommitHash) -> Result<(), RemoteError> {
        (**self).set_ref(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_base64_decodes() {
        let blob = EncodedBlob {
            content: "aGVs\nbG8g\nd29y\nbGQ=\n".to_string(),
            encoding: "base64".to_string(),
        };
        assert_eq!(blob.decode_utf8().unwrap(), "hello world");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let blob = EncodedBlob {
            content: "x".into(),
            encoding: "rot13".into(),
        };
        assert!(matches!(blob.decode(), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn tree_item_sends_hash_or_content() {
        let pending = Blob::Pending {
            path: "a.md".into(),
            content: "hi".into(),
        };
        let existing = Blob::Existing {
            path: "b.md".into(),
            content: Some("ignored".into()),
            hash: BlobHash::from("abc"),
        };
        let json = serde_json::to_value(TreeItem::from(&pending)).unwrap();
        assert_eq!(json["content"], "hi");
        assert!(json.get("sha").is_none());
        assert_eq!(json["mode"], "100644");

        let json = serde_json::to_value(TreeItem::from(&existing)).unwrap();
        assert_eq!(json["sha"], "abc");
        assert!(json.get("content").is_none());
        assert_eq!(json["type"], "blob");
    }
}
