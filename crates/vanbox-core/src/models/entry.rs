//! Entry model

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContentError;

/// Character limit enforced on drafts before they reach the store.
pub const MAX_CONTENT_CHARS: usize = 5000;

const DISPLAY_TIMESTAMP_FORMAT: &str = "%B %-d, %Y, %I:%M:%S %p";

/// Store-assigned identifier of an entry. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A saved entry as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier, assigned on insert
    pub id: EntryId,
    /// Plain text content, already trimmed
    pub content: String,
    /// Human-readable timestamp in the author's local clock at save time
    pub created_at_user_tz: String,
    /// Canonical creation instant, used for ordering only
    pub created_at_utc: DateTime<Utc>,
}

/// Insert payload for a new entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEntry {
    pub content: String,
    pub created_at_user_tz: String,
}

impl NewEntry {
    #[must_use]
    pub fn new(content: impl Into<String>, created_at_user_tz: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            created_at_user_tz: created_at_user_tz.into(),
        }
    }
}

/// Validate a draft and return the trimmed content to store.
///
/// The length limit applies to the draft as typed (what the character counter
/// shows), the emptiness check to the trimmed text.
pub fn validate_content(draft: &str, max_chars: usize) -> Result<String, ContentError> {
    let len = draft.chars().count();
    if len > max_chars {
        return Err(ContentError::TooLong {
            len,
            max: max_chars,
        });
    }

    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Err(ContentError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Format an instant the way entries display their creation time,
/// e.g. `January 5, 2024, 03:04:05 PM`.
#[must_use]
pub fn format_display_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.format(DISPLAY_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn validate_content_trims() {
        assert_eq!(
            validate_content("  hello \n", MAX_CONTENT_CHARS).unwrap(),
            "hello"
        );
    }

    #[test]
    fn validate_content_rejects_whitespace_only() {
        assert_eq!(
            validate_content(" \n\t ", MAX_CONTENT_CHARS),
            Err(ContentError::Empty)
        );
        assert_eq!(validate_content("", MAX_CONTENT_CHARS), Err(ContentError::Empty));
    }

    #[test]
    fn validate_content_enforces_limit_in_characters() {
        let at_limit = "é".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&at_limit, MAX_CONTENT_CHARS).is_ok());

        let over = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert_eq!(
            validate_content(&over, MAX_CONTENT_CHARS),
            Err(ContentError::TooLong {
                len: MAX_CONTENT_CHARS + 1,
                max: MAX_CONTENT_CHARS
            })
        );
    }

    #[test]
    fn display_timestamp_uses_long_format() {
        let at = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 5, 15, 4, 5)
            .unwrap();
        assert_eq!(format_display_timestamp(&at), "January 5, 2024, 03:04:05 PM");
    }

    #[test]
    fn display_timestamp_morning_hours() {
        let at = Utc.with_ymd_and_hms(2023, 11, 21, 9, 30, 0).unwrap();
        assert_eq!(
            format_display_timestamp(&at),
            "November 21, 2023, 09:30:00 AM"
        );
    }

    #[test]
    fn entry_deserializes_store_row() {
        let row = r#"{
            "id": "4f1c2a",
            "content": "first line\nsecond",
            "created_at_user_tz": "January 5, 2024, 03:04:05 PM",
            "created_at_utc": "2024-01-05T13:04:05.123456+00:00"
        }"#;
        let entry: Entry = serde_json::from_str(row).unwrap();
        assert_eq!(entry.id, EntryId::from("4f1c2a"));
        assert_eq!(entry.content, "first line\nsecond");
        assert_eq!(entry.created_at_utc.timestamp(), 1_704_459_845);
    }
}
