//! YAML frontmatter blocks (`---` fenced, at the top of a note) and tag extraction.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

use crate::error::VaultError;

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([\w/-]+)").expect("tag pattern is a valid regex"));

const FENCE: &str = "---";

/// Split a note into its raw frontmatter text (without fences) and its body.
///
/// Returns `(None, content)` when the first line is not a `---` fence or the block is never
/// closed.
pub fn split(content: &str) -> (Option<&str>, &str) {
    let Some(first_line_end) = content.find('\n') else {
        return (None, content);
    };
    if content[..first_line_end].trim_end_matches('\r') != FENCE {
        return (None, content);
    }
    let yaml_start = first_line_end + 1;
    let mut cursor = yaml_start;
    while cursor <= content.len() {
        let line_end = content[cursor..]
            .find('\n')
            .map(|offset| cursor + offset)
            .unwrap_or(content.len());
        if content[cursor..line_end].trim_end_matches('\r') == FENCE {
            let body_start = (line_end + 1).min(content.len());
            return (Some(&content[yaml_start..cursor]), &content[body_start..]);
        }
        if line_end == content.len() {
            break;
        }
        cursor = line_end + 1;
    }
    (None, content)
}

/// Parse the frontmatter mapping, if any. Malformed YAML counts as absent.
pub fn parse(content: &str) -> Option<Mapping> {
    let (yaml, _) = split(content);
    let yaml = yaml?;
    if yaml.trim().is_empty() {
        return Some(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => Some(map),
        Ok(Value::Null) => Some(Mapping::new()),
        Ok(other) => {
            tracing::debug!("frontmatter is not a mapping: {:?}", other);
            None
        }
        Err(e) => {
            tracing::debug!("ignoring malformed frontmatter: {e}");
            None
        }
    }
}

/// Body text with any frontmatter block removed.
pub fn body(content: &str) -> &str {
    split(content).1
}

/// Write `frontmatter` above `body`. An empty mapping renders no block at all.
pub fn render(frontmatter: &Mapping, body: &str) -> Result<String, VaultError> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = serde_yaml::to_string(frontmatter)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

/// Union of frontmatter `tags` (a list or a single string) and inline `#tag` tokens in the body.
/// Sorted and de-duplicated; leading `#` characters are stripped.
pub fn extract_tags(content: &str, frontmatter: Option<&Mapping>) -> Vec<String> {
    let mut tags = BTreeSet::new();
    if let Some(value) = frontmatter.and_then(|fm| fm.get("tags")) {
        match value {
            Value::Sequence(items) => {
                for item in items {
                    if let Some(tag) = item.as_str() {
                        insert_tag(&mut tags, tag);
                    }
                }
            }
            Value::String(tag) => insert_tag(&mut tags, tag),
            _ => {}
        }
    }
    for capture in TAG_PATTERN.captures_iter(body(content)) {
        if let Some(tag) = capture.get(1) {
            insert_tag(&mut tags, tag.as_str());
        }
    }
    tags.into_iter().collect()
}

fn insert_tag(tags: &mut BTreeSet<String>, raw: &str) {
    let tag = raw.trim().trim_start_matches('#');
    if !tag.is_empty() {
        tags.insert(tag.to_string());
    }
}
