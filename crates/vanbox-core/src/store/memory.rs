//! In-memory entry store with owner scoping.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::{DeleteReport, EntryQuery, EntryStore, SortOrder};
use crate::auth::AuthSession;
use crate::error::{StoreError, StoreResult};
use crate::models::{Entry, EntryId, NewEntry};

/// Number of calls the store has received, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub inserts: usize,
    pub selects: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<(String, Entry)>,
    last_created_at: Option<DateTime<Utc>>,
    offline: bool,
    calls: StoreCalls,
}

/// Entry store kept in process memory.
///
/// Rows are only visible to, and deletable by, the user who inserted them:
/// deleting someone else's entry removes zero rows instead of failing, the
/// same way row-level security behaves.
#[derive(Clone, Default)]
pub struct InMemoryEntryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryEntryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: every call fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    #[must_use]
    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    /// Number of entries owned by `user_id`.
    #[must_use]
    pub fn count_for(&self, user_id: &str) -> usize {
        self.lock()
            .rows
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline {
            return Err(StoreError::Unavailable("network is offline".to_string()));
        }
        Ok(())
    }

    // Strictly increasing so ordering never ties.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

impl EntryStore for InMemoryEntryStore {
    async fn insert(&self, session: &AuthSession, entry: &NewEntry) -> StoreResult<Entry> {
        let mut state = self.lock();
        state.calls.inserts += 1;
        state.ensure_online()?;

        let created = Entry {
            id: EntryId::new(Uuid::now_v7().to_string()),
            content: entry.content.clone(),
            created_at_user_tz: entry.created_at_user_tz.clone(),
            created_at_utc: state.next_created_at(),
        };
        state
            .rows
            .push((session.user.id.clone(), created.clone()));
        Ok(created)
    }

    async fn select(&self, session: &AuthSession, query: EntryQuery) -> StoreResult<Vec<Entry>> {
        let mut state = self.lock();
        state.calls.selects += 1;
        state.ensure_online()?;

        let mut entries = state
            .rows
            .iter()
            .filter(|(owner, _)| *owner == session.user.id)
            .map(|(_, entry)| entry.clone())
            .collect::<Vec<_>>();
        match query.order {
            SortOrder::NewestFirst => {
                entries.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));
            }
            SortOrder::OldestFirst => entries.sort_by_key(|entry| entry.created_at_utc),
        }
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn delete(&self, session: &AuthSession, id: &EntryId) -> StoreResult<DeleteReport> {
        let mut state = self.lock();
        state.calls.deletes += 1;
        state.ensure_online()?;

        let before = state.rows.len();
        state
            .rows
            .retain(|(owner, entry)| !(entry.id == *id && *owner == session.user.id));
        Ok(DeleteReport {
            removed: before - state.rows.len(),
        })
    }
}
