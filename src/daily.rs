//! Date-named daily notes: `<folder>/YYYY-MM-DD.<ext>`.
use chrono::{Local, NaiveDate};
use serde_yaml::{Mapping, Value};

use crate::{
    error::VaultError,
    paths,
    store::{Note, NoteMeta, NoteStore},
};

pub const DEFAULT_DAILY_FOLDER: &str = "Daily Notes";
pub const DAILY_NOTE_TAG: &str = "daily-note";
pub const DAILY_DATE_FORMAT: &str = "%Y-%m-%d";
/// Daily notes dated further back than this are left out of listings.
pub const DAILY_LOOKBACK_DAYS: i64 = 90;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date coming from a caller.
pub fn parse_date(raw: &str) -> Result<NaiveDate, VaultError> {
    NaiveDate::parse_from_str(raw.trim(), DAILY_DATE_FORMAT).map_err(|e| {
        VaultError::InvalidInput(format!("invalid date {raw:?} (expected YYYY-MM-DD): {e}"))
    })
}

pub fn daily_note_path(
    date: NaiveDate,
    folder: &str,
    extension: &str,
) -> Result<String, VaultError> {
    let name = format!("{}.{extension}", date.format(DAILY_DATE_FORMAT));
    paths::normalize(&paths::join(folder, &name))
}

/// The date a daily note is named after, if `path` is named like one.
pub fn daily_note_date(path: &str, extension: &str) -> Option<NaiveDate> {
    if !paths::extension(path)?.eq_ignore_ascii_case(extension) {
        return None;
    }
    let stem = paths::stem(path);
    if stem.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(stem, DAILY_DATE_FORMAT).ok()
}

/// Frontmatter and body of a freshly created daily note.
pub fn daily_note_skeleton(date: NaiveDate) -> (Mapping, String) {
    let mut frontmatter = Mapping::new();
    frontmatter.insert(
        Value::from("date"),
        Value::from(date.format(DAILY_DATE_FORMAT).to_string()),
    );
    frontmatter.insert(Value::from("tags"), Value::from(vec![DAILY_NOTE_TAG]));
    let body = format!("# {}\n\n", date.format("%A, %B %d, %Y"));
    (frontmatter, body)
}

/// Read the daily note for `date`. A missing note is created from [daily_note_skeleton] when
/// `create` is set and reported as [VaultError::NotFound] otherwise.
pub fn get_daily_note<S: NoteStore + ?Sized>(
    store: &S,
    date: NaiveDate,
    folder: &str,
    create: bool,
) -> Result<Note, VaultError> {
    let path = daily_note_path(date, folder, &store.config().default_extension)?;
    match store.read(&path) {
        Err(VaultError::NotFound(_)) if create => {
            let (frontmatter, body) = daily_note_skeleton(date);
            store.create(&path, &body, Some(&frontmatter), false)?;
            store.read(&path)
        }
        other => other,
    }
}

/// Daily notes directly inside `folder` dated no earlier than `DAILY_LOOKBACK_DAYS` before
/// `today`, most recently modified first.
pub fn list_daily_notes<S: NoteStore + ?Sized>(
    store: &S,
    folder: &str,
    limit: usize,
    today: NaiveDate,
) -> Result<Vec<NoteMeta>, VaultError> {
    let extension = &store.config().default_extension;
    let cutoff = today - chrono::Duration::days(DAILY_LOOKBACK_DAYS);
    let mut notes = store
        .list_notes(folder, false, Some(store.config().enumeration_limit), false)?
        .into_iter()
        .filter(|meta| daily_note_date(&meta.path, extension).is_some_and(|date| date >= cutoff))
        .collect::<Vec<NoteMeta>>();
    notes.truncate(limit);
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_note_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            daily_note_path(date, "Daily Notes", "md").unwrap(),
            "Daily Notes/2024-03-05.md"
        );
        assert_eq!(daily_note_path(date, "", "md").unwrap(), "2024-03-05.md");
        assert_eq!(daily_note_date("Daily Notes/2024-03-05.md", "md"), Some(date));
        assert_eq!(daily_note_date("2024-3-5.md", "md"), None);
        assert_eq!(daily_note_date("2024-03-05.canvas", "md"), None);
        assert_eq!(daily_note_date("Meeting.md", "md"), None);
    }

    #[test]
    fn skeleton_has_date_and_tag() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let (frontmatter, body) = daily_note_skeleton(date);
        assert_eq!(frontmatter.get("date").and_then(|v| v.as_str()), Some("2024-03-05"));
        assert_eq!(
            frontmatter.get("tags"),
            Some(&Value::from(vec![DAILY_NOTE_TAG]))
        );
        assert_eq!(body, "# Tuesday, March 05, 2024\n\n");
    }

    #[test]
    fn dates_must_be_iso() {
        assert!(parse_date("2024-03-05").is_ok());
        assert!(matches!(parse_date("05/03/2024"), Err(VaultError::InvalidInput(_))));
    }
}
