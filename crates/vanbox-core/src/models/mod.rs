//! Data models for Vanbox

mod entry;

pub use entry::{
    format_display_timestamp, validate_content, Entry, EntryId, NewEntry, MAX_CONTENT_CHARS,
};
