//! Session management with at-most-one in-flight refresh.
//!
//! The [`SessionManager`] is the only mutator of the session. Every change is
//! a whole-value replacement written through to the [`SessionStore`], and the
//! FSM transition for it happens under the same lock, so readers never see a
//! state that disagrees with the session.
//!
//! Concurrent `refresh()` callers share one pending future: the check for an
//! existing refresh and the registration of a new one happen under a single
//! lock with no suspension point in between.
//!
//! Every login, OAuth exchange, restore and logout starts a new session
//! generation. A refresh remembers the generation it started in and only
//! applies its result if that generation is still current, so a refresh that
//! settles after a logout cannot re-authenticate, and a failed refresh that
//! settles after a new login cannot log the new session out.

use crate::auth_fsm::{
    AuthSnapshot, AuthState, AuthStateChangedPayload, SessionMachine, SessionMachineInput,
};
use crate::client::{AuthClient, LoginCredentials};
use crate::navigation::Navigator;
use crate::projection::ProjectionCache;
use crate::session::{normalize_credentials, project_user, user_keys, Session};
use crate::store::SessionStore;
use crate::{AuthError, AuthResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use portal_config_and_utils::DeploymentFlavor;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, Option<Session>>>;

struct PendingRefresh {
    id: u64,
    future: RefreshFuture,
}

struct Inner {
    client: AuthClient,
    store: Arc<dyn SessionStore>,
    flavor: DeploymentFlavor,
    navigator: Arc<dyn Navigator>,
    projections: Arc<ProjectionCache>,
    session: RwLock<Option<Session>>,
    /// Only changed while `session` is write-locked.
    generation: AtomicU64,
    fsm: Mutex<SessionMachine>,
    pending: Mutex<Option<PendingRefresh>>,
    next_refresh_id: AtomicU64,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

/// Owner of the current session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        client: AuthClient,
        store: Arc<dyn SessionStore>,
        flavor: DeploymentFlavor,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                flavor,
                navigator,
                projections: Arc::new(ProjectionCache::new()),
                session: RwLock::new(None),
                generation: AtomicU64::new(0),
                fsm: Mutex::new(SessionMachine::new()),
                pending: Mutex::new(None),
                next_refresh_id: AtomicU64::new(0),
                state_callback: Mutex::new(None),
            }),
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.inner.state_callback.lock() = Some(callback);
    }

    pub fn flavor(&self) -> DeploymentFlavor {
        self.inner.flavor
    }

    pub fn client(&self) -> &AuthClient {
        &self.inner.client
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    pub fn projections(&self) -> &Arc<ProjectionCache> {
        &self.inner.projections
    }

    /// Name of the persistence backend in use.
    pub fn store_backend(&self) -> &'static str {
        self.inner.store.backend()
    }

    pub fn state(&self) -> AuthState {
        AuthState::from(self.inner.fsm.lock().state())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.read().is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.session.read().clone()
    }

    /// `"<tokenType> <token>"`, or an empty string when unauthenticated.
    pub fn auth_header(&self) -> String {
        self.inner
            .session
            .read()
            .as_ref()
            .map(Session::auth_header)
            .unwrap_or_default()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let user = self.current_user();
        let state = self.state();
        AuthSnapshot {
            state,
            authenticated: state.is_authenticated(),
            refresh_in_flight: self.refresh_in_flight(),
            user,
        }
    }

    fn current_user(&self) -> Option<Value> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|session| session.user.clone())
            .filter(|user| !user.is_null())
    }

    /// Seed the in-memory session from the store.
    ///
    /// Returns whether a session was found.
    pub fn restore(&self) -> bool {
        match self.inner.store.load() {
            Some(session) => {
                debug!(
                    backend = self.inner.store.backend(),
                    has_refresh_token = session.refresh_credential().is_some(),
                    "Restored session from store"
                );
                self.install(session, None, SessionMachineInput::Restore, false);
                true
            }
            None => {
                debug!(backend = self.inner.store.backend(), "No stored session");
                false
            }
        }
    }

    /// Log in with account and password.
    ///
    /// Failures are returned to the caller for display.
    pub async fn login(&self, account: &str, password: &str) -> AuthResult<Session> {
        let credentials = LoginCredentials {
            account: account.to_string(),
            password: password.to_string(),
        };

        let payload = self.inner.client.login(&credentials).await.map_err(|err| {
            warn!(error = %err, "Login request failed");
            err
        })?;
        let session = normalize_credentials(self.inner.flavor, payload)?;

        self.install(
            session.clone(),
            None,
            SessionMachineInput::LoginSucceeded,
            true,
        );
        info!(user_id = session.user_id().as_deref().unwrap_or("-"), "Login successful");
        Ok(session)
    }

    /// Exchange the `state` of an OAuth callback for a session.
    pub async fn exchange_oauth_state(&self, state: &str) -> AuthResult<Session> {
        let payload = self.inner.client.callback(state).await.map_err(|err| {
            warn!(error = %err, "OAuth state exchange failed");
            err
        })?;
        let session = normalize_credentials(self.inner.flavor, payload)?;

        self.install(
            session.clone(),
            None,
            SessionMachineInput::LoginSucceeded,
            true,
        );
        info!(user_id = session.user_id().as_deref().unwrap_or("-"), "OAuth login successful");
        Ok(session)
    }

    /// Navigate to the authorization page of `provider`.
    ///
    /// Without a backend resolver the URL is built from configuration and no
    /// request is made. Returns the URL navigated to.
    pub async fn start_oauth_login(&self, provider: &str) -> AuthResult<String> {
        let client = &self.inner.client;
        let url = if client.endpoints().oauth_authorization_url_path.is_some() {
            client.authorization_url(provider).await?
        } else {
            client.authorize_redirect_url(provider)
        };

        info!(provider, "Starting OAuth login");
        self.inner.navigator.navigate(&url);
        Ok(url)
    }

    /// Renew the session.
    ///
    /// Resolves to the new session, or `None` when the session was cleared.
    /// Never fails: every error ends in a logout. Concurrent callers share
    /// one request. A refresh overtaken by a login or logout leaves the
    /// newer state alone and resolves to whatever session is current.
    pub async fn refresh(&self) -> Option<Session> {
        self.begin_refresh()?.await
    }

    /// Start a refresh, or join the one in flight, without waiting for it.
    ///
    /// The request is registered before this returns. Without a refresh
    /// token the session is logged out and `None` is returned.
    pub(crate) fn begin_refresh(&self) -> Option<RefreshFuture> {
        let mut pending = self.inner.pending.lock();

        let Some((refresh_token, generation)) = self.refresh_credential() else {
            drop(pending);
            debug!("No refresh token held, renewal impossible");
            self.logout();
            return None;
        };

        match pending.as_ref() {
            Some(existing) => {
                debug!(refresh_id = existing.id, "Joining in-flight refresh");
                Some(existing.future.clone())
            }
            None => {
                let id = self.inner.next_refresh_id.fetch_add(1, Ordering::SeqCst);
                let future = self.spawn_refresh(id, refresh_token, generation);
                *pending = Some(PendingRefresh {
                    id,
                    future: future.clone(),
                });
                Some(future)
            }
        }
    }

    /// Wait until no refresh is in flight.
    ///
    /// A rotated refresh token only reaches the store when its response is
    /// handled, so hosts call this before exiting.
    pub async fn settle(&self) {
        let pending = self
            .inner
            .pending
            .lock()
            .as_ref()
            .map(|pending| pending.future.clone());
        if let Some(future) = pending {
            debug!("Waiting for in-flight refresh to settle");
            future.await;
        }
    }

    fn refresh_credential(&self) -> Option<(String, u64)> {
        let session = self.inner.session.read();
        let token = session.as_ref()?.refresh_credential()?.to_string();
        Some((token, self.inner.generation.load(Ordering::SeqCst)))
    }

    fn spawn_refresh(&self, id: u64, refresh_token: String, generation: u64) -> RefreshFuture {
        let manager = self.clone();
        let task = tokio::spawn(async move {
            let result = manager.run_refresh(&refresh_token, generation).await;
            manager.finish_refresh(id);
            result
        });

        let manager = self.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(refresh_id = id, error = %err, "Refresh task did not complete");
                    manager.finish_refresh(id);
                    if manager.clear_session(Some(generation)) {
                        None
                    } else {
                        manager.current_session()
                    }
                }
            }
        }
        .boxed()
        .shared()
    }

    fn finish_refresh(&self, id: u64) {
        let mut pending = self.inner.pending.lock();
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
        }
    }

    async fn run_refresh(&self, refresh_token: &str, generation: u64) -> Option<Session> {
        debug!(generation, "Refreshing session");

        let outcome = match self.inner.client.refresh(refresh_token).await {
            Ok(payload) => normalize_credentials(self.inner.flavor, payload),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(session) => {
                let installed = self.install(
                    session.clone(),
                    Some(generation),
                    SessionMachineInput::RefreshSucceeded,
                    true,
                );
                if installed {
                    info!(
                        user_id = session.user_id().as_deref().unwrap_or("-"),
                        renewable = session.refresh_credential().is_some(),
                        "Session refreshed"
                    );
                    Some(session)
                } else {
                    info!("Session changed while refreshing, discarding renewed credentials");
                    self.current_session()
                }
            }
            Err(err) => {
                if self.clear_session(Some(generation)) {
                    warn!(error = %err, "Refresh failed, session cleared");
                    None
                } else {
                    debug!(error = %err, "Stale refresh failed, newer session kept");
                    self.current_session()
                }
            }
        }
    }

    /// Replace the user snapshot with a fresh profile from the backend.
    pub async fn fetch_current_user(&self) -> AuthResult<Session> {
        let (header, generation) = {
            let session = self.inner.session.read();
            let current = session
                .as_ref()
                .ok_or_else(|| AuthError::transport(Some(401), "Not logged in"))?;
            (
                current.auth_header(),
                self.inner.generation.load(Ordering::SeqCst),
            )
        };

        let payload = self.inner.client.me(Some(&header)).await?;
        let user = project_user(&payload, user_keys(self.inner.flavor));

        self.replace_user(generation, user).ok_or_else(|| {
            AuthError::transport(Some(401), "Session ended while loading the profile")
        })
    }

    fn replace_user(&self, generation: u64, user: Value) -> Option<Session> {
        let (updated, changed) = {
            let mut current = self.inner.session.write();
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return None;
            }
            let mut updated = current.clone()?;
            updated.user = user;
            self.inner.store.save(&updated);
            *current = Some(updated.clone());
            (updated, self.apply(&SessionMachineInput::ProfileUpdated))
        };
        self.notify(changed);
        debug!("User snapshot replaced");
        Some(updated)
    }

    /// Clear the session everywhere. Safe to call when already logged out.
    pub fn logout(&self) {
        self.clear_session(None);
    }

    /// Install `session` as a whole value.
    ///
    /// With `expected_generation` the install only happens if no login or
    /// logout happened since; without it a new generation starts.
    fn install(
        &self,
        session: Session,
        expected_generation: Option<u64>,
        input: SessionMachineInput,
        persist: bool,
    ) -> bool {
        let changed = {
            let mut current = self.inner.session.write();
            match expected_generation {
                Some(expected) if expected != self.inner.generation.load(Ordering::SeqCst) => {
                    return false;
                }
                Some(_) => {}
                None => {
                    self.inner.generation.fetch_add(1, Ordering::SeqCst);
                }
            }
            if persist {
                self.inner.store.save(&session);
            }
            *current = Some(session);
            self.apply(&input)
        };
        self.notify(changed);
        true
    }

    fn clear_session(&self, expected_generation: Option<u64>) -> bool {
        let (had_session, changed) = {
            let mut current = self.inner.session.write();
            if let Some(expected) = expected_generation {
                if expected != self.inner.generation.load(Ordering::SeqCst) {
                    return false;
                }
            }
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            let had_session = current.take().is_some();
            self.inner.store.clear();
            (had_session, self.apply(&SessionMachineInput::Logout))
        };

        self.inner.projections.clear();
        self.notify(changed);

        if had_session {
            info!("Logged out");
        } else {
            debug!("Logout without an active session");
        }
        true
    }

    /// Feed the FSM; returns the new state if it changed.
    fn apply(&self, input: &SessionMachineInput) -> Option<AuthState> {
        let mut fsm = self.inner.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        if fsm.consume(input).is_err() {
            debug!(input = ?input, state = ?old_state, "Ignoring inapplicable auth input");
            return None;
        }

        let new_state = AuthState::from(fsm.state());
        if old_state == new_state {
            return None;
        }
        debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        Some(new_state)
    }

    fn notify(&self, changed: Option<AuthState>) {
        let Some(state) = changed else {
            return;
        };
        let user = self.current_user();
        let callback = self.inner.state_callback.lock();
        if let Some(callback) = callback.as_ref() {
            callback(AuthStateChangedPayload { state, user });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::TracingNavigator;
    use crate::store::LocalSessionStore;
    use portal_config_and_utils::{AuthEndpoints, LEGACY_SESSION_KEY};
    use portal_storage::{KeyValueStorage, MemoryStorage};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn create_test_manager() -> (SessionManager, Arc<dyn KeyValueStorage>) {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let store = Arc::new(LocalSessionStore::new(
            Some(storage.clone()),
            LEGACY_SESSION_KEY,
        ));
        // Nothing listens on port 1; any request that slips through fails fast.
        let client = AuthClient::new("http://127.0.0.1:1", AuthEndpoints::member());
        let manager = SessionManager::new(
            client,
            store,
            DeploymentFlavor::Member,
            Arc::new(TracingNavigator),
        );
        (manager, storage)
    }

    fn store_session(storage: &Arc<dyn KeyValueStorage>, session: &Session) {
        storage
            .set(LEGACY_SESSION_KEY, &serde_json::to_string(session).unwrap())
            .unwrap();
    }

    #[test]
    fn test_initial_state() {
        let (manager, _) = create_test_manager();
        assert_eq!(manager.state(), AuthState::Unauthenticated);
        assert!(!manager.is_authenticated());
        assert_eq!(manager.auth_header(), "");
        assert!(!manager.refresh_in_flight());
    }

    #[test]
    fn test_restore_seeds_from_store() {
        let (manager, storage) = create_test_manager();
        store_session(
            &storage,
            &Session::new("T1").with_user(json!({"memberId": 3})),
        );

        assert!(manager.restore());
        assert_eq!(manager.state(), AuthState::Authenticated);
        assert_eq!(manager.auth_header(), "Bearer T1");

        let snapshot = manager.snapshot();
        assert!(snapshot.authenticated);
        assert!(!snapshot.refresh_in_flight);
        assert_eq!(snapshot.user, Some(json!({"memberId": 3})));
    }

    #[test]
    fn test_restore_with_empty_store() {
        let (manager, _) = create_test_manager();
        assert!(!manager.restore());
        assert_eq!(manager.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_logs_out() {
        let (manager, storage) = create_test_manager();
        store_session(&storage, &Session::new("T1"));
        manager.restore();

        assert!(manager.refresh().await.is_none());
        assert!(!manager.is_authenticated());
        assert_eq!(manager.state(), AuthState::Unauthenticated);
        assert_eq!(storage.get(LEGACY_SESSION_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let (manager, storage) = create_test_manager();
        store_session(&storage, &Session::new("T1").with_refresh_token("R1"));
        manager.restore();

        assert!(manager.refresh().await.is_none());
        assert!(!manager.is_authenticated());
        assert!(!manager.refresh_in_flight());
        assert_eq!(storage.get(LEGACY_SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (manager, storage) = create_test_manager();
        store_session(&storage, &Session::new("T1"));
        manager.restore();

        manager.logout();
        manager.logout();

        assert_eq!(manager.state(), AuthState::Unauthenticated);
        assert_eq!(manager.auth_header(), "");
    }

    #[test]
    fn test_logout_clears_projections() {
        let (manager, storage) = create_test_manager();
        store_session(&storage, &Session::new("T1"));
        manager.restore();
        manager.projections().set_profile(json!({"nickname": "n"}));

        manager.logout();
        assert!(manager.projections().profile().is_none());
    }

    #[test]
    fn test_state_callback_invoked_on_transition() {
        let (manager, storage) = create_test_manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        manager.set_state_callback(Box::new(move |_payload| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        store_session(&storage, &Session::new("T1"));
        manager.restore();
        manager.logout();
        // already logged out: no state change, no call
        manager.logout();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_install_is_rejected() {
        let (manager, _) = create_test_manager();
        let generation = manager.inner.generation.load(Ordering::SeqCst);

        manager.logout();

        assert!(!manager.install(
            Session::new("LATE"),
            Some(generation),
            SessionMachineInput::RefreshSucceeded,
            true
        ));
        assert!(!manager.is_authenticated());
    }
}
