//! Applying an imported document (front matter + body) onto a post.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_yaml::Value;

use treesync_core::types::{slugify, BlobHash, Post, PostId, PostStatus, PostType};

use crate::export::keys;
use crate::front_matter::FrontMatter;

/// The post id named by the `ID` key, if any.
pub fn front_matter_id(fm: &FrontMatter) -> Option<PostId> {
    match fm.get(keys::ID)? {
        Value::Number(n) => n.as_u64().map(PostId),
        Value::String(s) => s.trim().parse().ok().map(PostId),
        _ => None,
    }
}

/// The raw `permalink` value, if it is a string.
pub fn front_matter_permalink(fm: &FrontMatter) -> Option<&str> {
    fm.get(keys::PERMALINK).and_then(Value::as_str)
}

/// Rewrite a permalink to a site-relative path.
///
/// Absolute URLs under `site_url` lose the site prefix; relative values gain a
/// leading `/`. URLs on other hosts are left alone (`None`).
pub fn site_relative_permalink(value: &str, site_url: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let site = site_url.trim().trim_end_matches('/');
    if let (false, Some(head), Some(tail)) = (
        site.is_empty(),
        value.get(..site.len()),
        value.get(site.len()..),
    ) {
        if head.eq_ignore_ascii_case(site) && (tail.is_empty() || tail.starts_with('/')) {
            return Some(if tail.is_empty() { "/".to_string() } else { tail.to_string() });
        }
    }
    if value.contains("://") {
        return None;
    }
    if value.starts_with('/') {
        Some(value.to_string())
    } else {
        Some(format!("/{value}"))
    }
}

/// Overlay `fm` and `body` onto `base`, tagging it with the blob it came from.
///
/// Keys the importer does not understand are kept in `meta`. A missing title
/// or slug is derived from the file name at `path`.
pub fn apply_document(
    mut base: Post,
    fm: &FrontMatter,
    body: &str,
    path: &str,
    hash: BlobHash,
) -> Post {
    let stem = file_slug(path);

    if let Some(title) = fm.get(keys::TITLE).and_then(scalar_string) {
        base.title = title;
    } else if base.title.is_empty() {
        base.title = stem.replace('-', " ");
    }

    if let Some(slug) = fm.get(keys::SLUG).and_then(scalar_string) {
        base.slug = slugify(&slug);
    }
    if base.slug.is_empty() {
        base.slug = slugify(&stem);
    }

    if let Some(date) = fm.get(keys::DATE).and_then(Value::as_str).and_then(parse_date) {
        base.date = date;
    }
    if let Some(layout) = fm.get(keys::LAYOUT).and_then(scalar_string) {
        base.post_type = PostType::from(layout);
    }
    if let Some(published) = fm.get(keys::PUBLISHED).and_then(Value::as_bool) {
        base.status = if published {
            PostStatus::Publish
        } else {
            PostStatus::Draft
        };
    }
    if let Some(permalink) = front_matter_permalink(fm) {
        base.permalink = Some(permalink.to_string());
    }
    if let Some(categories) = fm.get(keys::CATEGORIES) {
        base.categories = string_list(categories);
    }
    if let Some(tags) = fm.get(keys::TAGS) {
        base.tags = string_list(tags);
    }

    base.meta = fm
        .iter()
        .filter(|(k, _)| !keys::RESERVED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    base.body = body.to_string();
    base.content_hash = Some(hash);
    base.remote_path = Some(path.to_string());
    base
}

/// File stem with a leading `YYYY-MM-DD-` removed (`_posts/2024-01-02-hi.md` → `hi`).
pub fn file_slug(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let bytes = stem.as_bytes();
    let dated = bytes.len() > 11
        && bytes[..10]
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() })
        && bytes[10] == b'-';
    if dated {
        stem[11..].to_string()
    } else {
        stem.to_string()
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, RFC 3339, or a bare `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front_matter;

    fn fm(yaml: &str) -> FrontMatter {
        front_matter::parse_front_matter(yaml).unwrap()
    }

    #[test]
    fn id_accepts_numbers_and_strings() {
        assert_eq!(front_matter_id(&fm("ID: 7")), Some(PostId(7)));
        assert_eq!(front_matter_id(&fm("ID: '8'")), Some(PostId(8)));
        assert_eq!(front_matter_id(&fm("ID: [1]")), None);
        assert_eq!(front_matter_id(&fm("title: x")), None);
    }

    #[test]
    fn permalink_rewrites_site_urls_only() {
        let site = "https://blog.example.com/";
        assert_eq!(
            site_relative_permalink("https://blog.example.com/2024/hello/", site).as_deref(),
            Some("/2024/hello/")
        );
        assert_eq!(
            site_relative_permalink("HTTPS://Blog.Example.com", site).as_deref(),
            Some("/")
        );
        assert_eq!(site_relative_permalink("about/", site).as_deref(), Some("/about/"));
        assert_eq!(site_relative_permalink("https://elsewhere.org/x", site), None);
        assert_eq!(
            site_relative_permalink("https://blog.example.community/x", site),
            None
        );
    }

    #[test]
    fn apply_document_maps_known_keys() {
        let base = Post::new(PostId(3), "", "");
        let meta = fm("post_title: Hi there\nlayout: page\npublished: false\ntags: a, b\ncategories: [news]\npost_date: 2024-02-03 04:05:06\nsubtitle: extra\n");
        let post = apply_document(base, &meta, "body", "_pages/hi-there.md", BlobHash::from("h"));
        assert_eq!(post.title, "Hi there");
        assert_eq!(post.slug, "hi-there");
        assert_eq!(post.post_type, PostType::Page);
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(post.categories, vec!["news".to_string()]);
        assert_eq!(post.date.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-02-03 04:05:06");
        assert_eq!(post.meta.len(), 1);
        assert_eq!(post.body, "body");
        assert_eq!(post.content_hash, Some(BlobHash::from("h")));
        assert_eq!(post.remote_path.as_deref(), Some("_pages/hi-there.md"));
    }

    #[test]
    fn missing_title_comes_from_file_name() {
        let post = apply_document(
            Post::new(PostId(1), "", ""),
            &FrontMatter::new(),
            "",
            "_posts/2024-05-06-first-light.md",
            BlobHash::from("h"),
        );
        assert_eq!(post.title, "first light");
        assert_eq!(post.slug, "first-light");
    }

    #[test]
    fn existing_title_survives_when_front_matter_has_none() {
        let post = apply_document(
            Post::new(PostId(1), "Kept", ""),
            &FrontMatter::new(),
            "new body",
            "x.md",
            BlobHash::from("h"),
        );
        assert_eq!(post.title, "Kept");
        assert_eq!(post.body, "new body");
    }

    #[test]
    fn file_slug_handles_undated_names() {
        assert_eq!(file_slug("notes/plain.md"), "plain");
        assert_eq!(file_slug("2024-01-02.md"), "2024-01-02");
        assert_eq!(file_slug("noext"), "noext");
    }

    #[test]
    fn parse_date_formats() {
        assert!(parse_date("2024-01-02T03:04:05Z").is_some());
        assert!(parse_date("2024-01-02 03:04:05").is_some());
        assert!(parse_date("2024-01-02").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
