//! Entry lifecycle controller.
//!
//! Owns the in-memory entry list, the input draft and the delete prompt, and
//! runs save, reload, delete and export against an [`EntryStore`]. Local state
//! changes only after the store confirms; failures become notifications.
//!
//! Each operation kind is either idle or in flight. A trigger that arrives
//! while the same kind is in flight is ignored ([`Outcome::Busy`]). Results
//! that arrive after [`EntryController::teardown`] or after the session
//! changed are dropped ([`Outcome::Stale`]).

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::OperationError;
use crate::export::{build_export, ExportDocument};
use crate::models::{
    format_display_timestamp, validate_content, Entry, EntryId, NewEntry, MAX_CONTENT_CHARS,
};
use crate::notify::NotificationCenter;
use crate::session::{Session, SessionEvent, SessionProvider, Subscription};
use crate::store::{EntryQuery, EntryStore};

const SAVE_SUCCESS: &str = "Note saved!";
const SAVE_FAILED: &str = "Error: Could not save note. Please try again.";
const SAVE_FAILED_DURATION: Duration = Duration::from_millis(5000);
const RELOAD_FAILED: &str = "Failed to load history.";
const DELETE_SUCCESS: &str = "Note deleted successfully";
const EXPORT_EMPTY: &str = "No data to download.";
const EXPORT_STARTED: &str = "Data download started.";
const EXPORT_FAILED: &str = "Error downloading data.";
const SIGN_OUT_FAILED: &str = "Error signing out. Please try again.";

/// Limits applied by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Size of the in-memory history
    pub history_limit: usize,
    /// Character limit on drafts
    pub max_content_chars: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            max_content_chars: MAX_CONTENT_CHARS,
        }
    }
}

/// Result of a controller operation.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Completed and applied
    Done(T),
    /// Ignored: the same operation is already in flight
    Busy,
    /// Precondition failed; nothing was sent to the store
    Rejected(OperationError),
    /// The store call failed; local state is unchanged
    Failed(OperationError),
    /// The result arrived after teardown or a session change and was dropped
    Stale,
}

impl<T> Outcome<T> {
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    pub fn into_done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            _ => None,
        }
    }

    pub const fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Rejected(error) | Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Confirmation step of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrompt {
    pub entry_id: EntryId,
    /// Set while the confirmed delete is in flight
    pub busy: bool,
}

impl DeletePrompt {
    pub const TITLE: &'static str = "Delete Note";
    pub const MESSAGE: &'static str =
        "Are you sure you want to delete this note? This action cannot be undone.";
}

#[derive(Default)]
struct ViewState {
    entries: Vec<Entry>,
    draft: String,
    delete_prompt: Option<DeletePrompt>,
}

impl ViewState {
    fn reset(&mut self) {
        self.entries.clear();
        self.draft.clear();
        self.delete_prompt = None;
    }
}

#[derive(Default)]
struct Shared {
    view: Mutex<ViewState>,
    torn_down: AtomicBool,
    saving: AtomicBool,
    reload: Mutex<ReloadState>,
    deleting: AtomicBool,
    exporting: AtomicBool,
}

impl Shared {
    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct ReloadState {
    running: bool,
    /// Another fetch was asked for while one was running
    requested: bool,
}

fn lock_reload(state: &Mutex<ReloadState>) -> MutexGuard<'_, ReloadState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the reload slot. Checking for a pending request and releasing the
/// slot happen under one lock, so a request is either served by this run or
/// finds the slot free.
struct ReloadTurn<'a> {
    state: &'a Mutex<ReloadState>,
    held: bool,
}

impl<'a> ReloadTurn<'a> {
    /// Claim the slot, or leave a request for the run that holds it.
    fn try_begin(state: &'a Mutex<ReloadState>) -> Option<Self> {
        let mut guard = lock_reload(state);
        if guard.running {
            guard.requested = true;
            return None;
        }
        guard.running = true;
        guard.requested = false;
        Some(Self { state, held: true })
    }

    /// Take a pending request (`true`) or release the slot (`false`).
    fn next_pass(&mut self) -> bool {
        let mut guard = lock_reload(self.state);
        if guard.requested {
            guard.requested = false;
            return true;
        }
        guard.running = false;
        self.held = false;
        false
    }
}

impl Drop for ReloadTurn<'_> {
    fn drop(&mut self) {
        if self.held {
            lock_reload(self.state).running = false;
        }
    }
}

/// Marks one operation kind as in flight until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_begin(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EntryController<S: EntryStore> {
    store: S,
    session: Session,
    notifications: NotificationCenter,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl<S: EntryStore> EntryController<S> {
    /// Create a controller bound to `session`.
    ///
    /// The view is cleared whenever the signed-in user changes or signs out.
    pub fn new(store: S, session: Session, notifications: NotificationCenter) -> Self {
        let shared = Arc::new(Shared::default());
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = session.subscribe(move |event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match event {
                SessionEvent::SignedOut => tracing::debug!("Signed out; clearing entries"),
                SessionEvent::SignedIn(user) => {
                    tracing::debug!("Signed in as {}; clearing previous entries", user.id);
                }
            }
            shared.view().reset();
        });

        Self {
            store,
            session,
            notifications,
            clock: Arc::new(SystemClock),
            config: LifecycleConfig::default(),
            shared,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Entries currently shown, newest first.
    pub fn entries(&self) -> Vec<Entry> {
        self.shared.view().entries.clone()
    }

    pub fn draft(&self) -> String {
        self.shared.view().draft.clone()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.shared.view().draft = draft.into();
    }

    /// Character count shown next to the input.
    pub fn draft_chars(&self) -> usize {
        self.shared.view().draft.chars().count()
    }

    pub fn is_over_limit(&self) -> bool {
        self.draft_chars() > self.config.max_content_chars
    }

    /// Whether the save action is enabled.
    pub fn can_save(&self) -> bool {
        !self.is_saving()
            && validate_content(&self.shared.view().draft, self.config.max_content_chars).is_ok()
    }

    pub fn delete_prompt(&self) -> Option<DeletePrompt> {
        self.shared.view().delete_prompt.clone()
    }

    pub fn is_saving(&self) -> bool {
        self.shared.saving.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        lock_reload(&self.shared.reload).running
    }

    pub fn is_deleting(&self) -> bool {
        self.shared.deleting.load(Ordering::Acquire)
    }

    pub fn is_exporting(&self) -> bool {
        self.shared.exporting.load(Ordering::Acquire)
    }

    /// Save the draft as a new entry, then reload the history.
    pub async fn save(&self) -> Outcome<Entry> {
        let Some(guard) = InFlight::try_begin(&self.shared.saving) else {
            tracing::debug!("Save ignored: a save is already in flight");
            return Outcome::Busy;
        };

        let content = match validate_content(&self.draft(), self.config.max_content_chars) {
            Ok(content) => content,
            Err(error) => return Outcome::Rejected(error.into()),
        };
        let Some(snapshot) = self.session.snapshot() else {
            return Outcome::Rejected(OperationError::NotSignedIn);
        };

        let entry = NewEntry::new(content, format_display_timestamp(&self.clock.now()));
        let result = self.store.insert(&snapshot.session, &entry).await;
        if !self.accepts(snapshot.epoch) {
            tracing::warn!("Discarding save result that arrived after teardown or sign-out");
            return Outcome::Stale;
        }

        match result {
            Ok(saved) => {
                self.shared.view().draft.clear();
                self.notifications.success(SAVE_SUCCESS);
                drop(guard);
                self.reload().await;
                Outcome::Done(saved)
            }
            Err(error) => {
                tracing::error!("Save error: {error}");
                self.notifications.error_for(SAVE_FAILED, SAVE_FAILED_DURATION);
                Outcome::Failed(error.into())
            }
        }
    }

    /// Replace the history with the newest entries from the store.
    ///
    /// A reload requested while one is running makes the running one fetch
    /// again once it finishes; the caller gets [`Outcome::Busy`].
    pub async fn reload(&self) -> Outcome<usize> {
        let Some(snapshot) = self.session.snapshot() else {
            return Outcome::Rejected(OperationError::NotSignedIn);
        };
        let Some(mut turn) = ReloadTurn::try_begin(&self.shared.reload) else {
            return Outcome::Busy;
        };

        loop {
            let result = self
                .store
                .select(&snapshot.session, EntryQuery::recent(self.config.history_limit))
                .await;
            if !self.accepts(snapshot.epoch) {
                tracing::warn!("Discarding reload result that arrived after teardown or sign-out");
                return Outcome::Stale;
            }

            match result {
                Ok(entries) => {
                    let count = entries.len();
                    self.shared.view().entries = entries;
                    if !turn.next_pass() {
                        return Outcome::Done(count);
                    }
                    tracing::debug!("Reload requested while in flight; fetching again");
                }
                Err(error) => {
                    tracing::error!("Load entries error: {error}");
                    self.notifications.error(RELOAD_FAILED);
                    return Outcome::Failed(error.into());
                }
            }
        }
    }

    /// Open the confirmation prompt for deleting `entry_id`.
    pub fn request_delete(&self, entry_id: EntryId) -> Outcome<()> {
        if self.is_deleting() {
            return Outcome::Busy;
        }
        let mut view = self.shared.view();
        if view.delete_prompt.is_some() {
            return Outcome::Busy;
        }
        view.delete_prompt = Some(DeletePrompt {
            entry_id,
            busy: false,
        });
        Outcome::Done(())
    }

    /// Close the prompt. Has no effect while the delete is in flight.
    pub fn cancel_delete(&self) -> bool {
        let mut view = self.shared.view();
        if view.delete_prompt.as_ref().is_some_and(|prompt| !prompt.busy) {
            view.delete_prompt = None;
            true
        } else {
            false
        }
    }

    /// Delete the entry named by the open prompt.
    ///
    /// Succeeds only when the store reports a removed row; the entry then
    /// leaves the local list without a reload.
    pub async fn confirm_delete(&self) -> Outcome<EntryId> {
        let Some(snapshot) = self.session.snapshot() else {
            return Outcome::Rejected(OperationError::NotSignedIn);
        };
        let Some(_guard) = InFlight::try_begin(&self.shared.deleting) else {
            return Outcome::Busy;
        };
        let entry_id = {
            let mut view = self.shared.view();
            let Some(prompt) = view.delete_prompt.as_mut() else {
                return Outcome::Rejected(OperationError::NoPendingDelete);
            };
            prompt.busy = true;
            prompt.entry_id.clone()
        };

        let result = self.store.delete(&snapshot.session, &entry_id).await;
        if !self.accepts(snapshot.epoch) {
            tracing::warn!("Discarding delete result that arrived after teardown or sign-out");
            return Outcome::Stale;
        }

        let result = match result {
            Ok(report) if report.removed > 0 => Ok(()),
            Ok(_) => Err(OperationError::NothingDeleted),
            Err(error) => Err(OperationError::Store(error)),
        };

        match result {
            Ok(()) => {
                {
                    let mut view = self.shared.view();
                    view.entries.retain(|entry| entry.id != entry_id);
                    view.delete_prompt = None;
                }
                self.notifications.success(DELETE_SUCCESS);
                Outcome::Done(entry_id)
            }
            Err(error) => {
                tracing::error!("Delete error for entry {entry_id}: {error}");
                if let Some(prompt) = self.shared.view().delete_prompt.as_mut() {
                    prompt.busy = false;
                }
                self.notifications.error(delete_failure_message(&error));
                Outcome::Failed(error)
            }
        }
    }

    /// Render every entry, oldest first, into a downloadable document.
    ///
    /// `Done(None)` means there was nothing to export.
    pub async fn export(&self) -> Outcome<Option<ExportDocument>> {
        let Some(snapshot) = self.session.snapshot() else {
            return Outcome::Rejected(OperationError::NotSignedIn);
        };
        let Some(_guard) = InFlight::try_begin(&self.shared.exporting) else {
            return Outcome::Busy;
        };

        let result = self
            .store
            .select(&snapshot.session, EntryQuery::all_chronological())
            .await;
        if !self.accepts(snapshot.epoch) {
            tracing::warn!("Discarding export result that arrived after teardown or sign-out");
            return Outcome::Stale;
        }

        match result {
            Ok(entries) => match build_export(&entries, &self.clock.now()) {
                Some(document) => {
                    self.notifications.success(EXPORT_STARTED);
                    Outcome::Done(Some(document))
                }
                None => {
                    self.notifications.error(EXPORT_EMPTY);
                    Outcome::Done(None)
                }
            },
            Err(error) => {
                tracing::error!("Download error: {error}");
                self.notifications.error(EXPORT_FAILED);
                Outcome::Failed(error.into())
            }
        }
    }

    /// Sign out. The view is cleared even if the provider call fails.
    pub async fn sign_out<P: SessionProvider>(&self, provider: &P) -> Outcome<()> {
        match self.session.sign_out(provider).await {
            Ok(()) => Outcome::Done(()),
            Err(error) => {
                tracing::error!("Sign out error: {error}");
                self.notifications.error(SIGN_OUT_FAILED);
                Outcome::Failed(error.into())
            }
        }
    }

    /// Detach from the session. Results of operations still in flight are
    /// discarded when they arrive.
    pub fn teardown(&self) {
        self.shared.torn_down.store(true, Ordering::Release);
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn accepts(&self, epoch: u64) -> bool {
        !self.shared.torn_down.load(Ordering::Acquire) && self.session.is_current(epoch)
    }
}

fn delete_failure_message(error: &OperationError) -> String {
    match error {
        OperationError::NothingDeleted => error.to_string(),
        other => format!("Failed to delete note: {other}"),
    }
}
