//! Export path templates.
//!
//! Each post type maps to a tera template rendered against a [`PathContext`].
//!
//! | Template | Default                               |
//! |----------|---------------------------------------|
//! | `post`   | `_posts/{{ date }}-{{ slug }}.md`     |
//! | `page`   | `_pages/{{ slug }}.md`                |
//! | `draft`  | `_drafts/{{ slug }}.md`               |
//! | `custom` | `_{{ post_type }}s/{{ slug }}.md`     |
//!
//! Drafts of type `post` use `draft`; any type without its own template uses
//! `custom`. Site configuration may override or add templates by type name.

use std::collections::BTreeMap;

use serde::Serialize;
use tera::Tera;

use treesync_core::types::{Post, PostStatus, PostType};

use crate::error::ContentError;

const DEFAULTS: &[(&str, &str)] = &[
    ("post", "_posts/{{ date }}-{{ slug }}.md"),
    ("page", "_pages/{{ slug }}.md"),
    ("draft", "_drafts/{{ slug }}.md"),
    ("custom", "_{{ post_type }}s/{{ slug }}.md"),
];

/// Values available to path templates.
#[derive(Debug, Clone, Serialize)]
pub struct PathContext {
    pub id: u64,
    pub slug: String,
    pub title: String,
    /// `%Y-%m-%d`
    pub date: String,
    pub year: String,
    pub month: String,
    pub day: String,
    /// First category, or `uncategorized`.
    pub category: String,
    pub post_type: String,
}

impl PathContext {
    pub fn from_post(post: &Post) -> Self {
        let slug = if post.slug.is_empty() {
            post.id.to_string()
        } else {
            post.slug.clone()
        };
        Self {
            id: post.id.0,
            slug,
            title: post.title.clone(),
            date: post.date.format("%Y-%m-%d").to_string(),
            year: post.date.format("%Y").to_string(),
            month: post.date.format("%m").to_string(),
            day: post.date.format("%d").to_string(),
            category: post
                .categories
                .first()
                .cloned()
                .unwrap_or_else(|| "uncategorized".to_string()),
            post_type: post.post_type.to_string(),
        }
    }
}

/// Compiled path templates.
pub struct PathTemplates {
    tera: Tera,
}

impl PathTemplates {
    /// Built-in templates plus `overrides` (keyed by post type name).
    pub fn new(overrides: &BTreeMap<String, String>) -> Result<Self, ContentError> {
        let mut templates: BTreeMap<String, String> = DEFAULTS
            .iter()
            .map(|(name, tpl)| ((*name).to_string(), (*tpl).to_string()))
            .collect();
        for (name, tpl) in overrides {
            templates.insert(name.to_ascii_lowercase(), tpl.clone());
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
        Ok(Self { tera })
    }

    /// Template name used for `post`.
    pub fn template_for(&self, post: &Post) -> String {
        if post.post_type == PostType::Post && post.status == PostStatus::Draft {
            return "draft".to_string();
        }
        let name = post.post_type.as_str().to_ascii_lowercase();
        if self.tera.get_template_names().any(|t| t == name) {
            name
        } else {
            "custom".to_string()
        }
    }

    /// Render the export path of `post`.
    pub fn render(&self, post: &Post) -> Result<String, ContentError> {
        let template = self.template_for(post);
        let ctx = tera::Context::from_serialize(PathContext::from_post(post))?;
        let rendered = self.tera.render(&template, &ctx)?;
        let path = normalize_path(&rendered);
        if path.is_empty() {
            return Err(ContentError::EmptyPath { template });
        }
        Ok(path)
    }
}

/// Forward slashes, no leading `/`, no empty or `.` segments.
pub fn normalize_path(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use treesync_core::types::PostId;

    fn post() -> Post {
        let mut p = Post::new(PostId(4), "A Post", "body");
        p.date = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        p
    }

    #[test]
    fn default_post_path_uses_date_and_slug() {
        let t = PathTemplates::new(&BTreeMap::new()).unwrap();
        assert_eq!(t.render(&post()).unwrap(), "_posts/2024-01-05-a-post.md");
    }

    #[test]
    fn drafts_and_pages_use_their_own_templates() {
        let t = PathTemplates::new(&BTreeMap::new()).unwrap();
        let mut draft = post();
        draft.status = PostStatus::Draft;
        assert_eq!(t.render(&draft).unwrap(), "_drafts/a-post.md");

        let mut page = post();
        page.post_type = PostType::Page;
        assert_eq!(t.render(&page).unwrap(), "_pages/a-post.md");
    }

    #[test]
    fn unknown_type_falls_back_to_custom() {
        let t = PathTemplates::new(&BTreeMap::new()).unwrap();
        let mut p = post();
        p.post_type = PostType::Custom("recipe".into());
        assert_eq!(t.render(&p).unwrap(), "_recipes/a-post.md");
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("post".to_string(), "{{ year }}/{{ slug }}.md".to_string());
        overrides.insert(
            "Recipe".to_string(),
            "kitchen/{{ category }}/{{ slug }}.md".to_string(),
        );
        let t = PathTemplates::new(&overrides).unwrap();
        assert_eq!(t.render(&post()).unwrap(), "2024/a-post.md");

        let mut p = post();
        p.post_type = PostType::Custom("recipe".into());
        p.categories = vec!["soups".into()];
        assert_eq!(t.render(&p).unwrap(), "kitchen/soups/a-post.md");
    }

    #[test]
    fn empty_slug_falls_back_to_id() {
        let t = PathTemplates::new(&BTreeMap::new()).unwrap();
        let mut p = post();
        p.slug.clear();
        assert_eq!(t.render(&p).unwrap(), "_posts/2024-01-05-4.md");
    }

    #[test]
    fn empty_render_is_an_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("page".to_string(), "{{ nothing | default(value='') }}".to_string());
        let t = PathTemplates::new(&overrides).unwrap();
        let mut p = post();
        p.post_type = PostType::Page;
        assert!(matches!(t.render(&p), Err(ContentError::EmptyPath { .. })));
    }

    #[test]
    fn normalize_strips_leading_and_duplicate_slashes() {
        assert_eq!(normalize_path("/a//b/./c.md"), "a/b/c.md");
        assert_eq!(normalize_path("a\\b.md"), "a/b.md");
    }
}
