//! Post storage.
//!
//! [`PostStore`] is the seam the sync engine talks to. [`FsPostStore`] keeps
//! one YAML file per post under `<home>/.treesync/posts/`; [`MemoryPostStore`]
//! backs unit tests and dry runs.
//!
//! # API pattern
//!
//! `FsPostStore::open_at(home)` takes an explicit home (tests use `TempDir`);
//! `FsPostStore::open()` derives it from `dirs::home_dir()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};
use crate::layout;
use crate::types::{BlobHash, Post, PostId};

/// CRUD surface over the local post set.
pub trait PostStore {
    /// Every post, ordered by id.
    fn list(&self) -> Result<Vec<Post>, CoreError>;

    fn get(&self, id: PostId) -> Result<Option<Post>, CoreError>;

    /// Insert or replace `post` under its id.
    fn save(&mut self, post: &Post) -> Result<(), CoreError>;

    /// Remove a post. Returns `false` if it did not exist.
    fn delete(&mut self, id: PostId) -> Result<bool, CoreError>;

    /// A fresh id, greater than any id currently stored.
    fn allocate_id(&self) -> Result<PostId, CoreError> {
        let max = self.list()?.iter().map(|p| p.id.0).max().unwrap_or(0);
        Ok(PostId(max + 1))
    }

    /// The post whose last-known remote hash is `hash`.
    fn find_by_hash(&self, hash: &BlobHash) -> Result<Option<Post>, CoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|p| p.content_hash.as_ref() == Some(hash)))
    }

    /// The post last recorded at remote `path`.
    fn find_by_remote_path(&self, path: &str) -> Result<Option<Post>, CoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|p| p.remote_path.as_deref() == Some(path)))
    }

    /// Record the remote hash (and the path it was found at) on a post.
    /// Returns `false` if the post no longer exists.
    fn set_content_hash(
        &mut self,
        id: PostId,
        hash: BlobHash,
        remote_path: &str,
    ) -> Result<bool, CoreError> {
        let Some(mut post) = self.get(id)? else {
            return Ok(false);
        };
        post.content_hash = Some(hash);
        post.remote_path = Some(remote_path.to_string());
        self.save(&post)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// YAML-per-post store rooted at `<home>/.treesync/posts/`.
#[derive(Debug, Clone)]
pub struct FsPostStore {
    dir: PathBuf,
}

impl FsPostStore {
    /// Open (creating the directory, mode `0700`, if needed).
    pub fn open_at(home: &Path) -> Result<Self, CoreError> {
        layout::ensure_root(home)?;
        let dir = layout::ensure_dir(&layout::posts_dir(home))?;
        Ok(Self { dir })
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, CoreError> {
        Self::open_at(&layout::home()?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<id>.yaml`: pure, no I/O.
    pub fn post_path(&self, id: PostId) -> PathBuf {
        self.dir.join(format!("{}.yaml", id.0))
    }

    fn read(&self, path: &Path) -> Result<Post, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Parse `<id>.yaml` file names; anything else in the directory is ignored.
pub fn post_id_from_file_name(name: &str) -> Option<PostId> {
    name.strip_suffix(".yaml")?.parse().ok().map(PostId)
}

impl PostStore for FsPostStore {
    fn list(&self) -> Result<Vec<Post>, CoreError> {
        let mut entries: Vec<(PostId, PathBuf)> = std::fs::read_dir(&self.dir)
            .map_err(|e| io_err(&self.dir, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let id = post_id_from_file_name(&e.file_name().to_string_lossy())?;
                Some((id, e.path()))
            })
            .collect();
        entries.sort_by_key(|(id, _)| *id);

        entries.iter().map(|(_, path)| self.read(path)).collect()
    }

    fn get(&self, id: PostId) -> Result<Option<Post>, CoreError> {
        let path = self.post_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read(&path).map(Some)
    }

    fn save(&mut self, post: &Post) -> Result<(), CoreError> {
        let yaml = serde_yaml::to_string(post)?;
        layout::write_atomic(&self.post_path(post.id), yaml.as_bytes())
    }

    fn delete(&mut self, id: PostId) -> Result<bool, CoreError> {
        let path = self.post_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryPostStore {
    posts: BTreeMap<PostId, Post>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        Self {
            posts: posts.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

impl PostStore for MemoryPostStore {
    fn list(&self) -> Result<Vec<Post>, CoreError> {
        Ok(self.posts.values().cloned().collect())
    }

    fn get(&self, id: PostId) -> Result<Option<Post>, CoreError> {
        Ok(self.posts.get(&id).cloned())
    }

    fn save(&mut self, post: &Post) -> Result<(), CoreError> {
        self.posts.insert(post.id, post.clone());
        Ok(())
    }

    fn delete(&mut self, id: PostId) -> Result<bool, CoreError> {
        Ok(self.posts.remove(&id).is_some())
    }
}
