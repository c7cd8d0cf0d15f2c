//! Transient user-facing notifications (toasts).
//!
//! Messages stack in insertion order. Each one leaves on its own after its
//! duration, or earlier when dismissed, and is removed once the exit
//! transition has played.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;

/// How long a message stays visible unless told otherwise.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(3000);

/// Time between a dismissal and the removal from the queue.
pub const EXIT_TRANSITION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Visible,
    Leaving,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub duration: Duration,
    pub phase: Phase,
}

struct Inner {
    queue: watch::Sender<Vec<Notification>>,
    next_id: AtomicU64,
    exit_transition: Duration,
}

/// Cloneable handle to the notification queue.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_exit_transition(EXIT_TRANSITION)
    }

    #[must_use]
    pub fn with_exit_transition(exit_transition: Duration) -> Self {
        let (queue, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                queue,
                next_id: AtomicU64::new(1),
                exit_transition,
            }),
        }
    }

    /// Enqueue a message; `duration` defaults to [`DEFAULT_DURATION`].
    pub fn show(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Option<Duration>,
    ) -> NotificationId {
        let id = NotificationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let duration = duration.unwrap_or(DEFAULT_DURATION);
        let notification = Notification {
            id,
            kind,
            message: message.into(),
            duration,
            phase: Phase::Visible,
        };
        tracing::debug!(?kind, "notification {}: {}", id.0, notification.message);
        self.inner.queue.send_modify(|queue| queue.push(notification));

        let scheduled = self.schedule(duration, move |center| {
            center.dismiss(id);
        });
        if !scheduled {
            tracing::warn!("No async runtime; notification {} stays until dismissed", id.0);
        }
        id
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationKind::Success, None)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationKind::Error, None)
    }

    /// Error that needs more reading time than the default.
    pub fn error_for(&self, message: impl Into<String>, duration: Duration) -> NotificationId {
        self.show(message, NotificationKind::Error, Some(duration))
    }

    /// Start the exit transition of a visible message.
    ///
    /// Returns `false` when the message is already leaving or gone.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let started = self.inner.queue.send_if_modified(|queue| {
            match queue
                .iter_mut()
                .find(|notification| notification.id == id && notification.phase == Phase::Visible)
            {
                Some(notification) => {
                    notification.phase = Phase::Leaving;
                    true
                }
                None => false,
            }
        });
        if !started {
            return false;
        }

        let exit_transition = self.inner.exit_transition;
        if !self.schedule(exit_transition, move |center| center.remove(id)) {
            self.remove(id);
        }
        true
    }

    /// Current queue contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner.queue.borrow().clone()
    }

    /// Receiver that observes every change to the queue.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.queue.subscribe()
    }

    fn remove(&self, id: NotificationId) {
        self.inner.queue.send_if_modified(|queue| {
            let before = queue.len();
            queue.retain(|notification| notification.id != id);
            queue.len() != before
        });
    }

    fn schedule(&self, delay: Duration, action: impl FnOnce(Self) + Send + 'static) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                action(Self { inner });
            }
        });
        true
    }
}
