//! Entry store contract and adapters.
//!
//! The store is the authority for entries: it assigns ids and creation
//! instants and enforces per-user authorization. The client scopes every
//! call to the session's user as well, but that is not the security boundary.

mod memory;
mod supabase;

use std::future::Future;

use crate::auth::AuthSession;
use crate::error::StoreResult;
use crate::models::{Entry, EntryId, NewEntry};

pub use memory::{InMemoryEntryStore, StoreCalls};
pub use supabase::{normalize_rest_url, SupabaseEntryStore, DEFAULT_ENTRIES_TABLE};

/// Ordering by `created_at_utc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

/// Parameters of a select call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryQuery {
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl EntryQuery {
    /// The most recent `limit` entries, newest first.
    #[must_use]
    pub const fn recent(limit: usize) -> Self {
        Self {
            order: SortOrder::NewestFirst,
            limit: Some(limit),
        }
    }

    /// Every entry, oldest first.
    #[must_use]
    pub const fn all_chronological() -> Self {
        Self {
            order: SortOrder::OldestFirst,
            limit: None,
        }
    }
}

/// What a delete call actually removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: usize,
}

/// Trait for entry storage operations
pub trait EntryStore: Send + Sync {
    /// Insert a new entry owned by the session's user
    fn insert(
        &self,
        session: &AuthSession,
        entry: &NewEntry,
    ) -> impl Future<Output = StoreResult<Entry>> + Send;

    /// List the session user's entries
    fn select(
        &self,
        session: &AuthSession,
        query: EntryQuery,
    ) -> impl Future<Output = StoreResult<Vec<Entry>>> + Send;

    /// Delete one of the session user's entries, reporting the rows removed
    fn delete(
        &self,
        session: &AuthSession,
        id: &EntryId,
    ) -> impl Future<Output = StoreResult<DeleteReport>> + Send;
}
