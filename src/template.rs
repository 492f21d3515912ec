//! Note templates with `{{placeholder}}` substitution.
use chrono::{DateTime, Local};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use crate::{
    error::VaultError,
    store::{NoteMeta, NoteStore},
};

pub const DEFAULT_TEMPLATE_FOLDER: &str = "Templates";

/// Placeholders every template gets: `date`, `time` and `datetime`, plus `title` when given.
pub fn standard_replacements(
    now: DateTime<Local>,
    title: Option<&str>,
) -> BTreeMap<String, String> {
    let mut replacements = BTreeMap::new();
    replacements.insert("date".to_string(), now.format("%Y-%m-%d").to_string());
    replacements.insert("time".to_string(), now.format("%H:%M").to_string());
    replacements.insert("datetime".to_string(), now.format("%Y-%m-%d %H:%M").to_string());
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        replacements.insert("title".to_string(), title.to_string());
    }
    replacements
}

pub fn render(text: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{{{key}}}}}"), value)
        })
}

/// Substitute into string-valued top-level frontmatter fields. Other values are copied as is.
fn render_frontmatter(frontmatter: &Mapping, replacements: &BTreeMap<String, String>) -> Mapping {
    frontmatter
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => Value::String(render(text, replacements)),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Notes under `folder` and its subfolders, newest first.
pub fn list_templates<S: NoteStore + ?Sized>(
    store: &S,
    folder: &str,
) -> Result<Vec<NoteMeta>, VaultError> {
    store.list_notes(folder, true, Some(store.config().enumeration_limit), false)
}

/// Create `new_path` from the template at `template_path`. The template body and its
/// string frontmatter fields get `replacements` applied; the new note must not exist yet.
pub fn create_from_template<S: NoteStore + ?Sized>(
    store: &S,
    template_path: &str,
    new_path: &str,
    replacements: &BTreeMap<String, String>,
) -> Result<(), VaultError> {
    let template = store.read(template_path)?;
    let body = render(template.body(), replacements);
    let frontmatter = template
        .frontmatter
        .as_ref()
        .map(|fm| render_frontmatter(fm, replacements));
    store.create(new_path, &body, frontmatter.as_ref(), false)?;
    tracing::debug!("Created {} from template {}", new_path, template.path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn placeholders_are_substituted() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 0).unwrap();
        let replacements = standard_replacements(now, Some("Kickoff"));
        assert_eq!(
            render("# {{title}}\n{{date}} {{time}} ({{datetime}}) {{unknown}}", &replacements),
            "# Kickoff\n2024-03-05 09:07 (2024-03-05 09:07) {{unknown}}"
        );
        assert!(!standard_replacements(now, Some("")).contains_key("title"));
    }

    #[test]
    fn only_string_fields_are_rendered() {
        let mut replacements = BTreeMap::new();
        replacements.insert("title".to_string(), "Kickoff".to_string());
        let frontmatter: Mapping =
            serde_yaml::from_str("title: \"{{title}}\"\npriority: 2\ntags: [\"{{title}}\"]\n")
                .unwrap();
        let rendered = render_frontmatter(&frontmatter, &replacements);
        assert_eq!(rendered.get("title").and_then(|v| v.as_str()), Some("Kickoff"));
        assert_eq!(rendered.get("priority").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(rendered.get("tags"), frontmatter.get("tags"));
    }
}
