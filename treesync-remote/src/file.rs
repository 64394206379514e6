//! Object store persisted to a single JSON file, used by the `local` backend.
//!
//! Reads are served from the in-memory copy; every mutation is written back
//! with [`layout::write_atomic`] before the call returns.

use std::path::{Path, PathBuf};

use treesync_core::layout;
use treesync_core::types::{Blob, BlobHash, Commit, CommitHash, TreeHash, TreeSnapshot};

use crate::error::{io_err, RemoteError};
use crate::memory::MemoryObjectStore;
use crate::store::{EncodedBlob, ObjectStore};

#[derive(Debug)]
pub struct FileObjectStore {
    path: PathBuf,
    inner: MemoryObjectStore,
}

impl FileObjectStore {
    /// Open the store at `path`; a missing file is an empty repository.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let path = path.into();
        let inner = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryObjectStore::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        Ok(Self { path, inner })
    }

    /// `<home>/.treesync/remote.json`.
    pub fn open_at(home: &Path) -> Result<Self, RemoteError> {
        layout::ensure_root(home)?;
        Self::open(layout::remote_store_path(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    /// Commit files directly, as another client pushing to the branch would.
    pub fn commit_files(
        &mut self,
        files: &[(&str, &str)],
        message: &str,
    ) -> Result<Commit, RemoteError> {
        let commit = self.inner.commit_files(files, message)?;
        self.persist()?;
        Ok(commit)
    }

    fn persist(&self) -> Result<(), RemoteError> {
        let json = serde_json::to_vec_pretty(&self.inner)?;
        layout::write_atomic(&self.path, &json)?;
        Ok(())
    }
}

impl ObjectStore for FileObjectStore {
    fn get_ref(&self) -> Result<Option<CommitHash>, RemoteError> {
        self.inner.get_ref()
    }

    fn get_commit(&self, id: &CommitHash) -> Result<Commit, RemoteError> {
        self.inner.get_commit(id)
    }

    fn get_tree_recursive(&self, tree: &TreeHash) -> Result<TreeSnapshot, RemoteError> {
        self.inner.get_tree_recursive(tree)
    }

    fn get_blob(&self, hash: &BlobHash) -> Result<EncodedBlob, RemoteError> {
        self.inner.get_blob(hash)
    }

    fn create_tree(&mut self, blobs: &[Blob]) -> Result<TreeHash, RemoteError> {
        let tree = self.inner.create_tree(blobs)?;
        self.persist()?;
        Ok(tree)
    }

    fn create_commit(&mut self, tree: &TreeHash, message: &str) -> Result<Commit, RemoteError> {
        let commit = self.inner.create_commit(tree, message)?;
        self.persist()?;
        Ok(commit)
    }

    fn set_ref(&mut self, commit: &CommitHash) -> Result<(), RemoteError> {
        self.inner.set_ref(commit)?;
        self.persist()
    }
}
