//! Markdown export of a user's entries.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::Entry;

const EXPORT_FILE_PREFIX: &str = "vanbox_export";
const EXPORT_FILE_EXTENSION: &str = "md";

/// MIME type of the exported document.
pub const EXPORT_MIME_TYPE: &str = "text/markdown; charset=utf-8";

/// A rendered export ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: String,
    pub entry_count: usize,
}

impl ExportDocument {
    /// Write the document into `dir` under its file name.
    pub fn write_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.content)?;
        tracing::info!("Wrote export of {} entries to {}", self.entry_count, path.display());
        Ok(path)
    }
}

/// Render entries as frontmatter-delimited markdown blocks, in the order given.
#[must_use]
pub fn render_markdown_export(entries: &[Entry]) -> String {
    let mut output = String::new();

    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            output.push_str("\n\n");
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "Date: {}", entry.created_at_user_tz);
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        output.push_str(&entry.content);
    }

    output
}

/// File name derived from the export moment, `vanbox_export_YYYYMMDD_HHMMSS.md`.
#[must_use]
pub fn export_file_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{EXPORT_FILE_PREFIX}_{}.{EXPORT_FILE_EXTENSION}",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Build the export document, or `None` when there is nothing to export.
#[must_use]
pub fn build_export<Tz>(entries: &[Entry], at: &DateTime<Tz>) -> Option<ExportDocument>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if entries.is_empty() {
        return None;
    }

    Some(ExportDocument {
        file_name: export_file_name(at),
        mime_type: EXPORT_MIME_TYPE,
        content: render_markdown_export(entries),
        entry_count: entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryId;
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;

    fn entry(id: &str, content: &str, display: &str, secs: i64) -> Entry {
        Entry {
            id: EntryId::from(id),
            content: content.to_string(),
            created_at_user_tz: display.to_string(),
            created_at_utc: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn render_markdown_export_joins_blocks_with_blank_line() {
        let entries = vec![
            entry("1", "A", "Jan 1", 100),
            entry("2", "B\nsecond line", "Jan 2", 200),
        ];

        let rendered = render_markdown_export(&entries);
        assert_eq!(
            rendered,
            "---\nDate: Jan 1\n---\n\nA\n\n---\nDate: Jan 2\n---\n\nB\nsecond line"
        );
    }

    #[test]
    fn render_markdown_export_keeps_given_order() {
        let entries = vec![entry("1", "A", "Jan 1", 100), entry("2", "B", "Jan 2", 200)];
        let rendered = render_markdown_export(&entries);
        let a = rendered.find("\nA").unwrap();
        let b = rendered.find("\nB").unwrap();
        assert!(a < b);
    }

    #[test]
    fn export_file_name_uses_export_moment() {
        let at = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .unwrap();
        assert_eq!(export_file_name(&at), "vanbox_export_20240309_070501.md");
    }

    #[test]
    fn build_export_skips_empty_input() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert!(build_export(&[], &at).is_none());

        let document = build_export(&[entry("1", "A", "Jan 1", 100)], &at).unwrap();
        assert_eq!(document.entry_count, 1);
        assert_eq!(document.mime_type, EXPORT_MIME_TYPE);
    }

    #[test]
    fn write_to_dir_persists_document() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let document = build_export(&[entry("1", "Hello export", "Jan 1", 100)], &at).unwrap();

        let path = document.write_to_dir(dir.path()).unwrap();
        assert!(path.ends_with("vanbox_export_20240309_070501.md"));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("Hello export"));
    }
}
