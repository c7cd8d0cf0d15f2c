//! Process-wide session context.
//!
//! [`Session`] holds the current authenticated identity behind an accessor.
//! Every sign-in of a different user and every sign-out bumps an epoch, so
//! work started under an older identity can tell that its result is stale.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::auth::{AuthResult, AuthSession, AuthUser, SessionPersistence, SupabaseAuthClient};

/// Identity source the session context is initialised from.
pub trait SessionProvider: Send + Sync {
    /// Resolve the signed-in session, if any (restoring or refreshing it).
    fn current_session(&self) -> impl Future<Output = AuthResult<Option<AuthSession>>> + Send;

    /// URL to send the browser to for sign-in, returning to `return_path`.
    fn sign_in_with_redirect(&self, return_path: &str) -> AuthResult<String>;

    /// Revoke `session` with the identity provider.
    fn sign_out(&self, session: &AuthSession) -> impl Future<Output = AuthResult<()>> + Send;
}

impl<S: SessionPersistence> SessionProvider for SupabaseAuthClient<S> {
    async fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        self.restore_session().await
    }

    fn sign_in_with_redirect(&self, return_path: &str) -> AuthResult<String> {
        self.authorize_url(return_path)
    }

    async fn sign_out(&self, session: &AuthSession) -> AuthResult<()> {
        Self::sign_out(self, &session.access_token).await
    }
}

/// Change notification delivered to session listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(AuthUser),
    SignedOut,
}

/// The current session together with the epoch it was read at.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: AuthSession,
    pub epoch: u64,
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct SessionState {
    current: Option<AuthSession>,
    epoch: u64,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Default)]
struct SessionInner {
    state: RwLock<SessionState>,
    listeners: Mutex<Listeners>,
}

/// Cheaply cloneable handle to the process-wide session.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the session from `provider` on startup.
    pub async fn init<P: SessionProvider>(&self, provider: &P) -> AuthResult<Option<AuthUser>> {
        match provider.current_session().await? {
            Some(session) => {
                let user = session.user.clone();
                self.establish(session);
                Ok(Some(user))
            }
            None => {
                self.invalidate();
                Ok(None)
            }
        }
    }

    /// Install a freshly signed-in (or refreshed) session.
    ///
    /// Refreshing the tokens of the same user keeps the epoch, so in-flight
    /// operations stay valid. A different user starts a new epoch.
    pub fn establish(&self, session: AuthSession) {
        let event = {
            let mut state = self.write_state();
            let same_user = state
                .current
                .as_ref()
                .is_some_and(|current| current.user.id == session.user.id);
            let user = session.user.clone();
            state.current = Some(session);
            if same_user {
                None
            } else {
                state.epoch += 1;
                tracing::debug!("Session established for user {} (epoch {})", user.id, state.epoch);
                Some(SessionEvent::SignedIn(user))
            }
        };

        if let Some(event) = event {
            self.emit(&event);
        }
    }

    /// Drop the local session and start a new epoch. Returns the old session.
    pub fn invalidate(&self) -> Option<AuthSession> {
        let previous = {
            let mut state = self.write_state();
            let previous = state.current.take();
            if previous.is_some() {
                state.epoch += 1;
                tracing::debug!("Session invalidated (epoch {})", state.epoch);
            }
            previous
        };

        if previous.is_some() {
            self.emit(&SessionEvent::SignedOut);
        }
        previous
    }

    /// Sign out locally, then with the provider.
    ///
    /// The local session is gone even when the provider call fails.
    pub async fn sign_out<P: SessionProvider>(&self, provider: &P) -> AuthResult<()> {
        match self.invalidate() {
            Some(previous) => provider.sign_out(&previous).await,
            None => Ok(()),
        }
    }

    pub fn sign_in_with_redirect<P: SessionProvider>(
        &self,
        provider: &P,
        return_path: &str,
    ) -> AuthResult<String> {
        provider.sign_in_with_redirect(return_path)
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.read_state()
            .current
            .as_ref()
            .map(|session| session.user.clone())
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.read_state();
        state.current.as_ref().map(|session| SessionSnapshot {
            session: session.clone(),
            epoch: state.epoch,
        })
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.read_state().epoch
    }

    /// Whether no sign-in or sign-out happened since `epoch` was read.
    #[must_use]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.read_state().epoch == epoch
    }

    /// Register a change listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.lock_listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            session: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().entries.len()
    }

    fn emit(&self, event: &SessionEvent) {
        let listeners = self
            .lock_listeners()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(event);
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration handle returned by [`Session::subscribe`].
#[must_use = "dropping a subscription unregisters the listener"]
pub struct Subscription {
    id: u64,
    session: Weak<SessionInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.session.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Provider with a fixed session, for tests and offline hosts.
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    session: Mutex<Option<AuthSession>>,
    fail_sign_out: bool,
}

impl StaticSessionProvider {
    #[must_use]
    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            fail_sign_out: false,
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Make every sign-out call fail after the local session is gone.
    #[must_use]
    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }
}

impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn sign_in_with_redirect(&self, return_path: &str) -> AuthResult<String> {
        Ok(format!("/login?next={}", urlencoding::encode(return_path)))
    }

    async fn sign_out(&self, _session: &AuthSession) -> AuthResult<()> {
        if self.fail_sign_out {
            return Err(crate::auth::AuthError::Api("sign-out rejected".to_string()));
        }
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_session(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: i64::MAX,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            full_name: None,
            avatar_url: None,
        },
    }
}
