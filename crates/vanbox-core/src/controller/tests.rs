use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;

use super::*;
use crate::auth::AuthSession;
use crate::clock::FixedClock;
use crate::error::{ContentError, StoreError, StoreResult};
use crate::notify::NotificationKind;
use crate::session::{test_session, StaticSessionProvider};
use crate::store::{DeleteReport, InMemoryEntryStore};

fn export_moment() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 5, 15, 4, 5)
        .unwrap()
}

fn controller_for<S: EntryStore>(store: S, user: &str) -> EntryController<S> {
    let session = Session::new();
    session.establish(test_session(user));
    EntryController::new(store, session, NotificationCenter::new())
        .with_clock(FixedClock(export_moment()))
}

fn messages<S: EntryStore>(controller: &EntryController<S>) -> Vec<(NotificationKind, String)> {
    controller
        .notifications()
        .snapshot()
        .into_iter()
        .map(|notification| (notification.kind, notification.message))
        .collect()
}

fn contents(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|entry| entry.content.clone()).collect()
}

/// Store whose calls wait for a permit before reaching the inner store.
#[derive(Clone)]
struct GatedStore {
    inner: InMemoryEntryStore,
    gate: Arc<Semaphore>,
}

impl GatedStore {
    fn new(inner: InMemoryEntryStore) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    async fn wait(&self) {
        self.gate.acquire().await.unwrap().forget();
    }
}

impl EntryStore for GatedStore {
    async fn insert(&self, session: &AuthSession, entry: &NewEntry) -> StoreResult<Entry> {
        self.wait().await;
        self.inner.insert(session, entry).await
    }

    async fn select(&self, session: &AuthSession, query: EntryQuery) -> StoreResult<Vec<Entry>> {
        self.wait().await;
        self.inner.select(session, query).await
    }

    async fn delete(&self, session: &AuthSession, id: &EntryId) -> StoreResult<DeleteReport> {
        self.wait().await;
        self.inner.delete(session, id).await
    }
}

async fn save_text<S: EntryStore>(controller: &EntryController<S>, text: &str) -> Entry {
    controller.set_draft(text);
    controller.save().await.into_done().unwrap()
}

#[tokio::test]
async fn save_clears_draft_and_shows_new_entry() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");

    controller.set_draft("  remember the milk \n");
    assert!(controller.can_save());
    let saved = controller.save().await.into_done().unwrap();

    assert_eq!(saved.content, "remember the milk");
    assert_eq!(saved.created_at_user_tz, "January 5, 2024, 03:04:05 PM");
    assert_eq!(controller.draft(), "");
    assert_eq!(contents(&controller.entries()), vec!["remember the milk"]);
    assert_eq!(store.calls().inserts, 1);
    assert_eq!(
        messages(&controller),
        vec![(NotificationKind::Success, "Note saved!".to_string())]
    );
}

#[tokio::test]
async fn blank_draft_never_reaches_store() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");

    controller.set_draft(" \n\t ");
    assert!(!controller.can_save());
    let outcome = controller.save().await;

    assert!(matches!(
        outcome,
        Outcome::Rejected(OperationError::Validation(ContentError::Empty))
    ));
    assert_eq!(store.calls().inserts, 0);
    assert!(messages(&controller).is_empty());
}

#[tokio::test]
async fn over_limit_draft_is_rejected() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");

    controller.set_draft("x".repeat(MAX_CONTENT_CHARS + 1));
    assert!(controller.is_over_limit());
    assert!(!controller.can_save());
    assert!(matches!(
        controller.save().await,
        Outcome::Rejected(OperationError::Validation(ContentError::TooLong { .. }))
    ));
    assert_eq!(store.calls().inserts, 0);
}

#[tokio::test]
async fn save_without_session_is_rejected() {
    let store = InMemoryEntryStore::new();
    let controller = EntryController::new(store.clone(), Session::new(), NotificationCenter::new());

    controller.set_draft("hello");
    assert!(matches!(
        controller.save().await,
        Outcome::Rejected(OperationError::NotSignedIn)
    ));
    assert_eq!(store.calls().inserts, 0);
}

#[tokio::test]
async fn failed_save_keeps_draft_and_reports_generic_error() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    save_text(&controller, "first").await;

    store.set_offline(true);
    controller.set_draft("second");
    let outcome = controller.save().await;

    assert!(matches!(
        outcome,
        Outcome::Failed(OperationError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(controller.draft(), "second");
    assert_eq!(contents(&controller.entries()), vec!["first"]);

    let last = controller.notifications().snapshot().pop().unwrap();
    assert_eq!(last.kind, NotificationKind::Error);
    assert_eq!(last.message, "Error: Could not save note. Please try again.");
    assert_eq!(last.duration, Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn concurrent_saves_issue_one_insert() {
    let inner = InMemoryEntryStore::new();
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");
    controller.set_draft("only once");

    let first = controller.save();
    tokio::pin!(first);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut first)
        .await
        .is_err());
    assert!(controller.is_saving());
    assert!(!controller.can_save());

    assert!(controller.save().await.is_busy());
    assert!(controller.save().await.is_busy());

    // one insert plus the reload that follows it
    store.release(2);
    assert!(first.await.is_done());

    assert_eq!(inner.calls().inserts, 1);
    assert_eq!(inner.count_for("alice"), 1);
    assert!(!controller.is_saving());
}

#[tokio::test(start_paused = true)]
async fn teardown_discards_in_flight_save() {
    let inner = InMemoryEntryStore::new();
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");
    controller.set_draft("late");

    let save = controller.save();
    tokio::pin!(save);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut save)
        .await
        .is_err());

    controller.teardown();
    assert_eq!(controller.session().listener_count(), 0);
    store.release(1);

    assert!(matches!(save.await, Outcome::Stale));
    assert_eq!(controller.draft(), "late");
    assert!(controller.entries().is_empty());
    assert!(messages(&controller).is_empty());
}

#[tokio::test]
async fn reload_keeps_newest_twenty() {
    let store = InMemoryEntryStore::new();
    let session = test_session("alice");
    for index in 0..25 {
        store
            .insert(&session, &NewEntry::new(format!("note {index}"), "then"))
            .await
            .unwrap();
    }
    let controller = controller_for(store.clone(), "alice");

    assert_eq!(controller.reload().await.into_done(), Some(20));
    let entries = controller.entries();
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[0].content, "note 24");
    assert_eq!(entries[19].content, "note 5");
    assert!(entries
        .windows(2)
        .all(|pair| pair[0].created_at_utc > pair[1].created_at_utc));
}

#[tokio::test]
async fn reload_honours_configured_limit() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice").with_config(LifecycleConfig {
        history_limit: 2,
        max_content_chars: MAX_CONTENT_CHARS,
    });
    for text in ["a", "b", "c"] {
        save_text(&controller, text).await;
    }
    assert_eq!(contents(&controller.entries()), vec!["c", "b"]);
}

#[tokio::test]
async fn failed_reload_keeps_stale_list() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    save_text(&controller, "kept").await;

    store.set_offline(true);
    assert!(matches!(controller.reload().await, Outcome::Failed(_)));
    assert_eq!(contents(&controller.entries()), vec!["kept"]);
    assert_eq!(
        messages(&controller).last().unwrap(),
        &(NotificationKind::Error, "Failed to load history.".to_string())
    );
}

#[tokio::test]
async fn reload_only_sees_own_entries() {
    let store = InMemoryEntryStore::new();
    store
        .insert(&test_session("bob"), &NewEntry::new("bob's", "then"))
        .await
        .unwrap();
    let controller = controller_for(store.clone(), "alice");
    save_text(&controller, "alice's").await;

    assert_eq!(contents(&controller.entries()), vec!["alice's"]);
}

#[tokio::test(start_paused = true)]
async fn reload_requested_in_flight_runs_once_more() {
    let inner = InMemoryEntryStore::new();
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");

    let first = controller.reload();
    tokio::pin!(first);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut first)
        .await
        .is_err());
    assert!(controller.is_loading());

    inner
        .insert(&test_session("alice"), &NewEntry::new("arrived meanwhile", "now"))
        .await
        .unwrap();
    assert!(controller.reload().await.is_busy());

    store.release(2);
    assert_eq!(first.await.into_done(), Some(1));
    assert_eq!(inner.calls().selects, 2);
    assert_eq!(contents(&controller.entries()), vec!["arrived meanwhile"]);
}

#[tokio::test(start_paused = true)]
async fn sign_out_discards_in_flight_reload() {
    let inner = InMemoryEntryStore::new();
    inner
        .insert(&test_session("alice"), &NewEntry::new("secret", "then"))
        .await
        .unwrap();
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");
    let provider = StaticSessionProvider::signed_in(test_session("alice"));

    let reload = controller.reload();
    tokio::pin!(reload);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut reload)
        .await
        .is_err());

    assert!(controller.sign_out(&provider).await.is_done());
    store.release(1);

    assert!(matches!(reload.await, Outcome::Stale));
    assert!(controller.entries().is_empty());
}

#[tokio::test]
async fn delete_removes_entry_without_reload() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    let first = save_text(&controller, "first").await;
    save_text(&controller, "second").await;
    let selects_before = store.calls().selects;

    assert!(controller.request_delete(first.id.clone()).is_done());
    let prompt = controller.delete_prompt().unwrap();
    assert_eq!(prompt.entry_id, first.id);
    assert!(!prompt.busy);

    let deleted = controller.confirm_delete().await.into_done().unwrap();
    assert_eq!(deleted, first.id);
    assert_eq!(contents(&controller.entries()), vec!["second"]);
    assert!(controller.delete_prompt().is_none());
    assert_eq!(store.calls().selects, selects_before);
    assert_eq!(
        messages(&controller).last().unwrap(),
        &(NotificationKind::Success, "Note deleted successfully".to_string())
    );
}

#[tokio::test]
async fn delete_removing_no_rows_is_an_authorization_failure() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    let entry = save_text(&controller, "gone elsewhere").await;

    // removed behind the controller's back, so the store matches nothing
    store
        .delete(&test_session("alice"), &entry.id)
        .await
        .unwrap();

    controller.request_delete(entry.id.clone());
    let outcome = controller.confirm_delete().await;

    assert!(matches!(
        outcome,
        Outcome::Failed(OperationError::NothingDeleted)
    ));
    assert_eq!(contents(&controller.entries()), vec!["gone elsewhere"]);
    let prompt = controller.delete_prompt().unwrap();
    assert!(!prompt.busy);
    assert_eq!(
        messages(&controller).last().unwrap(),
        &(
            NotificationKind::Error,
            "Deletion failed. Please check permissions or try again.".to_string()
        )
    );
}

#[tokio::test]
async fn delete_transport_failure_is_distinct() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    let entry = save_text(&controller, "still here").await;

    store.set_offline(true);
    controller.request_delete(entry.id);
    let outcome = controller.confirm_delete().await;

    assert!(matches!(
        outcome,
        Outcome::Failed(OperationError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(contents(&controller.entries()), vec!["still here"]);
    let (kind, message) = messages(&controller).pop().unwrap();
    assert_eq!(kind, NotificationKind::Error);
    assert!(message.starts_with("Failed to delete note:"));
}

#[tokio::test]
async fn delete_prompt_blocks_second_request() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store, "alice");

    assert!(controller.request_delete(EntryId::from("a")).is_done());
    assert!(controller.request_delete(EntryId::from("b")).is_busy());
    assert_eq!(controller.delete_prompt().unwrap().entry_id, EntryId::from("a"));

    assert!(controller.cancel_delete());
    assert!(!controller.cancel_delete());
    assert!(controller.request_delete(EntryId::from("b")).is_done());
}

#[tokio::test]
async fn confirm_without_prompt_is_rejected() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");

    assert!(matches!(
        controller.confirm_delete().await,
        Outcome::Rejected(OperationError::NoPendingDelete)
    ));
    assert_eq!(store.calls().deletes, 0);
}

#[tokio::test(start_paused = true)]
async fn busy_delete_cannot_be_cancelled_or_repeated() {
    let inner = InMemoryEntryStore::new();
    let entry = inner
        .insert(&test_session("alice"), &NewEntry::new("x", "then"))
        .await
        .unwrap();
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");
    controller.request_delete(entry.id);

    let confirm = controller.confirm_delete();
    tokio::pin!(confirm);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut confirm)
        .await
        .is_err());

    assert!(controller.delete_prompt().unwrap().busy);
    assert!(!controller.cancel_delete());
    assert!(controller.confirm_delete().await.is_busy());
    assert!(controller.request_delete(EntryId::from("other")).is_busy());

    store.release(1);
    assert!(confirm.await.is_done());
    assert_eq!(inner.calls().deletes, 1);
    assert!(!controller.is_deleting());
}

#[tokio::test]
async fn export_with_no_entries_produces_no_document() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store, "alice");

    let outcome = controller.export().await;
    assert!(matches!(outcome, Outcome::Done(None)));
    assert_eq!(
        messages(&controller),
        vec![(NotificationKind::Error, "No data to download.".to_string())]
    );
}

#[tokio::test]
async fn export_is_chronological() {
    let store = InMemoryEntryStore::new();
    let session = test_session("alice");
    store
        .insert(&session, &NewEntry::new("A", "Jan 1"))
        .await
        .unwrap();
    store
        .insert(&session, &NewEntry::new("B", "Jan 2"))
        .await
        .unwrap();
    let controller = controller_for(store.clone(), "alice");
    controller.reload().await;
    assert_eq!(contents(&controller.entries()), vec!["B", "A"]);

    let document = controller.export().await.into_done().flatten().unwrap();
    assert_eq!(
        document.content,
        "---\nDate: Jan 1\n---\n\nA\n\n---\nDate: Jan 2\n---\n\nB"
    );
    assert_eq!(document.file_name, "vanbox_export_20240105_150405.md");
    assert_eq!(document.entry_count, 2);

    // the display list is untouched
    assert_eq!(contents(&controller.entries()), vec!["B", "A"]);
    assert_eq!(store.count_for("alice"), 2);
    assert_eq!(
        messages(&controller),
        vec![(NotificationKind::Success, "Data download started.".to_string())]
    );
}

#[tokio::test]
async fn export_failure_notifies() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store.clone(), "alice");
    store.set_offline(true);

    assert!(matches!(controller.export().await, Outcome::Failed(_)));
    assert_eq!(
        messages(&controller),
        vec![(NotificationKind::Error, "Error downloading data.".to_string())]
    );
}

#[tokio::test]
async fn sign_out_clears_view_even_if_provider_fails() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store, "alice");
    save_text(&controller, "private").await;
    controller.set_draft("unsent");
    controller.request_delete(EntryId::from("x"));

    let provider = StaticSessionProvider::signed_in(test_session("alice")).failing_sign_out();
    assert!(matches!(
        controller.sign_out(&provider).await,
        Outcome::Failed(OperationError::Auth(_))
    ));

    assert!(controller.session().current_user().is_none());
    assert!(controller.entries().is_empty());
    assert_eq!(controller.draft(), "");
    assert!(controller.delete_prompt().is_none());
    assert_eq!(
        messages(&controller).last().unwrap(),
        &(
            NotificationKind::Error,
            "Error signing out. Please try again.".to_string()
        )
    );
}

#[tokio::test]
async fn switching_user_clears_previous_entries() {
    let store = InMemoryEntryStore::new();
    let controller = controller_for(store, "alice");
    save_text(&controller, "alice only").await;

    controller.session().establish(test_session("bob"));
    assert!(controller.entries().is_empty());

    assert_eq!(controller.reload().await.into_done(), Some(0));
}

#[test]
fn reload_request_before_release_gets_another_pass() {
    let state = Mutex::new(ReloadState::default());
    let mut turn = ReloadTurn::try_begin(&state).unwrap();

    // a save finishing its insert after the fetch but before the run ends
    assert!(ReloadTurn::try_begin(&state).is_none());
    assert!(turn.next_pass());
    assert!(!turn.next_pass());
    assert!(!lock_reload(&state).running);
}

#[test]
fn reload_request_after_release_starts_its_own_run() {
    let state = Mutex::new(ReloadState::default());
    let mut turn = ReloadTurn::try_begin(&state).unwrap();
    assert!(!turn.next_pass());

    let next = ReloadTurn::try_begin(&state);
    assert!(next.is_some());

    // the released turn must not free the slot it no longer holds
    drop(turn);
    assert!(lock_reload(&state).running);
    drop(next);
    assert!(!lock_reload(&state).running);
    assert!(!lock_reload(&state).requested);
}

#[tokio::test(start_paused = true)]
async fn failed_reload_releases_the_slot() {
    let inner = InMemoryEntryStore::new();
    inner.set_offline(true);
    let store = GatedStore::new(inner.clone());
    let controller = controller_for(store.clone(), "alice");

    let reload = controller.reload();
    tokio::pin!(reload);
    assert!(tokio::time::timeout(Duration::from_millis(10), &mut reload)
        .await
        .is_err());
    assert!(controller.reload().await.is_busy());

    store.release(1);
    assert!(matches!(reload.await, Outcome::Failed(_)));
    assert!(!controller.is_loading());

    inner.set_offline(false);
    store.release(1);
    assert_eq!(controller.reload().await.into_done(), Some(0));
}
