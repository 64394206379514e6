//! Front-matter documents: a `---` line, a YAML mapping, a closing `---`
//! line, then the body.
//!
//! Splitting is a two-phase scan rather than a pattern match:
//! 1. the first line must be the delimiter, otherwise there is no block;
//! 2. the following lines are scanned for the first closing delimiter.
//!
//! An opening delimiter without a closing one yields no front matter and the
//! whole text as body.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::error::ContentError;

pub const DELIMITER: &str = "---";

/// Parsed front-matter keys.
pub type FrontMatter = BTreeMap<String, Value>;

/// Borrowed split of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// The whole block including both delimiter lines.
    pub block: Option<&'a str>,
    /// The raw YAML between the delimiters.
    pub raw: Option<&'a str>,
    pub body: &'a str,
}

/// Parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
}

/// `true` if the first line of `content` is the delimiter.
pub fn has_front_matter(content: &str) -> bool {
    let first = content.split('\n').next().unwrap_or_default();
    is_delimiter(first)
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Split `content` into its front-matter block and body.
pub fn split(content: &str) -> Split<'_> {
    let no_block = Split {
        block: None,
        raw: None,
        body: content,
    };

    let Some(first_end) = content.find('\n') else {
        return no_block;
    };
    if !is_delimiter(&content[..first_end]) {
        return no_block;
    }

    let raw_start = first_end + 1;
    let mut cursor = raw_start;
    while cursor <= content.len() {
        let line_end = content[cursor..]
            .find('\n')
            .map(|i| cursor + i)
            .unwrap_or(content.len());
        if is_delimiter(&content[cursor..line_end]) {
            let body_start = (line_end + 1).min(content.len());
            return Split {
                block: Some(&content[..body_start]),
                raw: Some(&content[raw_start..cursor]),
                body: &content[body_start..],
            };
        }
        if line_end == content.len() {
            break;
        }
        cursor = line_end + 1;
    }

    no_block
}

/// Parse the raw YAML of a front-matter block into a key/value mapping.
///
/// Empty blocks give an empty mapping; non-string keys are stringified.
pub fn parse_front_matter(raw: &str) -> Result<FrontMatter, ContentError> {
    if raw.trim().is_empty() {
        return Ok(FrontMatter::new());
    }
    match serde_yaml::from_str::<Value>(raw)? {
        Value::Null => Ok(FrontMatter::new()),
        Value::Mapping(mapping) => Ok(mapping
            .into_iter()
            .map(|(k, v)| (key_to_string(k), v))
            .collect()),
        _ => Err(ContentError::FrontMatterNotMapping),
    }
}

fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Split and parse a whole document.
pub fn parse(content: &str) -> Result<Document, ContentError> {
    let split = split(content);
    let front_matter = split.raw.map(parse_front_matter).transpose()?;
    Ok(Document {
        front_matter,
        body: split.body.to_string(),
    })
}

/// Render `front_matter` and `body` as a document.
pub fn render(front_matter: &FrontMatter, body: &str) -> Result<String, ContentError> {
    let yaml = if front_matter.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(front_matter)?
    };
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.is_empty() && !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_finds_block_and_body() {
        let doc = "---\ntitle: Hi\n---\nBody text\n";
        let s = split(doc);
        assert_eq!(s.block, Some("---\ntitle: Hi\n---\n"));
        assert_eq!(s.raw, Some("title: Hi\n"));
        assert_eq!(s.body, "Body text\n");
    }

    #[test]
    fn split_stops_at_first_closing_delimiter() {
        let doc = "---\na: 1\n---\nintro\n---\nmore\n";
        let s = split(doc);
        assert_eq!(s.raw, Some("a: 1\n"));
        assert_eq!(s.body, "intro\n---\nmore\n");
    }

    #[test]
    fn unterminated_block_is_all_body() {
        let doc = "---\ntitle: Hi\nno close";
        let s = split(doc);
        assert!(s.block.is_none());
        assert_eq!(s.body, doc);
    }

    #[test]
    fn empty_block_parses_to_empty_mapping() {
        let doc = parse("---\n---\nbody").unwrap();
        assert_eq!(doc.front_matter, Some(FrontMatter::new()));
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn crlf_delimiters_are_accepted() {
        let doc = parse("---\r\ntitle: x\r\n---\r\nbody\r\n").unwrap();
        let fm = doc.front_matter.expect("front matter");
        assert_eq!(fm.get("title"), Some(&Value::from("x")));
        assert_eq!(doc.body, "body\r\n");
    }

    #[test]
    fn delimiter_must_be_first_line() {
        assert!(!has_front_matter("# Title\n---\na: 1\n---\n"));
        assert!(has_front_matter("---\n"));
        assert!(has_front_matter("---   \nx: 1\n---\n"));
        assert!(!has_front_matter("----\n"));
    }

    #[test]
    fn list_front_matter_is_rejected() {
        let err = parse("---\n- a\n- b\n---\nbody").unwrap_err();
        assert!(matches!(err, ContentError::FrontMatterNotMapping));
    }

    #[test]
    fn render_then_parse_keeps_body_bytes() {
        let mut fm = FrontMatter::new();
        fm.insert("post_title".into(), Value::from("Hello"));
        let body = "para one\n\n---\n\npara two";
        let text = render(&fm, body).unwrap();
        assert!(text.starts_with("---\npost_title: Hello\n---\n"));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.body, body);
        assert_eq!(doc.front_matter, Some(fm));
    }
}
