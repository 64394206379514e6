//! Export representation of a post: target path plus front matter and body.

use serde_yaml::Value;

use treesync_core::config::SiteConfig;
use treesync_core::types::{BlobHash, Post, PostId, PostStatus};

use crate::error::ContentError;
use crate::front_matter::{self, FrontMatter};
use crate::paths::PathTemplates;

/// Front-matter keys written by the exporter and consumed by the importer.
pub mod keys {
    pub const ID: &str = "ID";
    pub const TITLE: &str = "post_title";
    pub const DATE: &str = "post_date";
    pub const SLUG: &str = "slug";
    pub const LAYOUT: &str = "layout";
    pub const PUBLISHED: &str = "published";
    pub const PERMALINK: &str = "permalink";
    pub const CATEGORIES: &str = "categories";
    pub const TAGS: &str = "tags";

    pub const RESERVED: &[&str] = &[
        ID, TITLE, DATE, SLUG, LAYOUT, PUBLISHED, PERMALINK, CATEGORIES, TAGS,
    ];
}

/// Everything the reconciler needs to know about one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPost {
    pub id: PostId,
    /// Last-known remote hash.
    pub hash: Option<BlobHash>,
    pub path: String,
    pub content: String,
}

/// Renders posts into their export path and content.
pub struct PostRenderer {
    paths: PathTemplates,
}

impl PostRenderer {
    pub fn new(config: &SiteConfig) -> Result<Self, ContentError> {
        Ok(Self {
            paths: PathTemplates::new(&config.path_templates)?,
        })
    }

    /// Renderer with only the built-in path templates.
    pub fn with_defaults() -> Result<Self, ContentError> {
        Ok(Self {
            paths: PathTemplates::new(&Default::default())?,
        })
    }

    pub fn export_path(&self, post: &Post) -> Result<String, ContentError> {
        self.paths.render(post)
    }

    pub fn export_content(&self, post: &Post) -> Result<String, ContentError> {
        front_matter::render(&front_matter_for(post), &post.body)
    }

    pub fn export(&self, post: &Post) -> Result<ExportedPost, ContentError> {
        Ok(ExportedPost {
            id: post.id,
            hash: post.content_hash.clone(),
            path: self.export_path(post)?,
            content: self.export_content(post)?,
        })
    }
}

/// Front matter written for `post`. Extra `meta` keys never shadow the
/// reserved ones.
pub fn front_matter_for(post: &Post) -> FrontMatter {
    let mut fm = FrontMatter::new();
    for (k, v) in &post.meta {
        if !keys::RESERVED.contains(&k.as_str()) {
            fm.insert(k.clone(), v.clone());
        }
    }

    fm.insert(keys::ID.into(), Value::from(post.id.0));
    fm.insert(keys::TITLE.into(), Value::from(post.title.clone()));
    fm.insert(
        keys::DATE.into(),
        Value::from(post.date.format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    fm.insert(keys::SLUG.into(), Value::from(post.slug.clone()));
    fm.insert(keys::LAYOUT.into(), Value::from(post.post_type.to_string()));
    fm.insert(
        keys::PUBLISHED.into(),
        Value::from(post.status == PostStatus::Publish),
    );
    if let Some(permalink) = &post.permalink {
        fm.insert(keys::PERMALINK.into(), Value::from(permalink.clone()));
    }
    if !post.categories.is_empty() {
        fm.insert(keys::CATEGORIES.into(), string_list(&post.categories));
    }
    if !post.tags.is_empty() {
        fm.insert(keys::TAGS.into(), string_list(&post.tags));
    }
    fm
}

fn string_list(items: &[String]) -> Value {
    Value::Sequence(items.iter().cloned().map(Value::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post() -> Post {
        let mut p = Post::new(PostId(12), "Hello World", "The body.\n");
        p.date = Utc.with_ymd_and_hms(2023, 11, 2, 9, 30, 0).unwrap();
        p.tags = vec!["rust".into()];
        p
    }

    #[test]
    fn export_content_has_front_matter_then_body() {
        let r = PostRenderer::with_defaults().unwrap();
        let content = r.export_content(&post()).unwrap();
        assert!(content.starts_with("---\n"));
        assert!(content.contains("ID: 12\n"));
        assert!(content.contains("post_title: Hello World\n"));
        assert!(content.contains("post_date:"));
        assert!(content.contains("2023-11-02 09:30:00"));
        assert!(content.ends_with("---\nThe body.\n"));
    }

    #[test]
    fn export_is_deterministic() {
        let r = PostRenderer::with_defaults().unwrap();
        assert_eq!(r.export(&post()).unwrap(), r.export(&post()).unwrap());
    }

    #[test]
    fn meta_cannot_shadow_reserved_keys() {
        let mut p = post();
        p.meta.insert("ID".into(), Value::from(999));
        p.meta.insert("subtitle".into(), Value::from("extra"));
        let fm = front_matter_for(&p);
        assert_eq!(fm.get("ID"), Some(&Value::from(12u64)));
        assert_eq!(fm.get("subtitle"), Some(&Value::from("extra")));
    }

    #[test]
    fn export_carries_stored_hash() {
        let mut p = post();
        p.content_hash = Some(BlobHash::from("abc"));
        let r = PostRenderer::with_defaults().unwrap();
        let exported = r.export(&p).unwrap();
        assert_eq!(exported.hash, Some(BlobHash::from("abc")));
        assert_eq!(exported.path, "_posts/2023-11-02-hello-world.md");
    }
}
