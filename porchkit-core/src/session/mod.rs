//! Process-wide authentication session state.
//!
//! One [`SessionManager`] exists per process, constructed at app start
//! and handed down to every screen. It is the sole writer of
//! [`SessionState`]; consumers hold read-only watch receivers and
//! re-render when the state changes.
//!
//! The design is deliberately event-sourced: `sign_up`/`sign_in` do not
//! touch state themselves — the authoritative transition arrives through
//! the provider's session-change stream shortly after the operation
//! completes. Concurrent operations are not serialized; events apply in
//! arrival order and the last write wins. The single exception is
//! `update_profile`, which merges its fields into the current user
//! optimistically before the round trip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::warn;

use crate::identity::{IdentityClient, SessionSubscription};
use crate::navigation::Navigator;
use crate::{PorchkitResult, ProfileUpdate, SessionPayload, User};

/// Reactive session value every consumer observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Currently authenticated user, if any.
    pub user: Option<User>,
    /// True from process start until the first session resolution
    /// (bootstrap or change event) completes; never true again after.
    pub loading: bool,
}

impl SessionState {
    const fn initial() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

/// Owns the authentication session for the process lifetime.
///
/// Construction registers exactly one session-change subscription and
/// kicks off the bootstrap fetch; the two race, and whichever resolves
/// first clears [`SessionState::loading`]. The manager stays reactive
/// until [`SessionManager::shutdown`], after which any use is a
/// programming error and panics.
pub struct SessionManager {
    identity: Arc<dyn IdentityClient>,
    navigator: Arc<dyn Navigator>,
    state: Arc<watch::Sender<SessionState>>,
    subscription: Mutex<Option<SessionSubscription>>,
    active: AtomicBool,
}

impl SessionManager {
    /// Starts the session manager: subscribes to session changes, then
    /// spawns the bootstrap fetch on the current tokio runtime.
    ///
    /// A bootstrap failure resolves the signed-out state rather than
    /// leaving consumers stuck on `loading`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(
        identity: Arc<dyn IdentityClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::initial());
        let state = Arc::new(state);

        let subscription = {
            let state = Arc::clone(&state);
            identity.subscribe_to_session_changes(Box::new(move |payload| {
                apply_resolution(&state, payload);
            }))
        };

        let manager = Arc::new(Self {
            identity: Arc::clone(&identity),
            navigator,
            state: Arc::clone(&state),
            subscription: Mutex::new(Some(subscription)),
            active: AtomicBool::new(true),
        });

        // Races with the first change event; either clears `loading`,
        // the later one wins on `user`.
        tokio::spawn(async move {
            match identity.bootstrap_session().await {
                Ok(payload) => apply_resolution(&state, payload),
                Err(err) => {
                    warn!("session bootstrap failed, resolving signed-out: {err}");
                    apply_resolution(&state, None);
                }
            }
        });

        manager
    }

    /// Subscribes to session state changes. Receivers are read-only; the
    /// manager is the single writer.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.ensure_active();
        self.state.subscribe()
    }

    /// Returns a snapshot of the current session state.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.ensure_active();
        self.state.borrow().clone()
    }

    /// Creates an account with the given credentials.
    ///
    /// Session state does not change synchronously: if the provider
    /// creates a session, the transition arrives through the
    /// session-change stream shortly after this returns.
    ///
    /// # Errors
    ///
    /// Returns the identity provider's structured error for the caller
    /// to render; nothing is retried automatically.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down.
    pub async fn sign_up(&self, email: &str, password: &str) -> PorchkitResult<()> {
        self.ensure_active();
        self.identity.sign_up(email, password).await
    }

    /// Authenticates with the given credentials. Same contract as
    /// [`SessionManager::sign_up`]: state updates arrive via the
    /// session-change stream, not synchronously.
    ///
    /// # Errors
    ///
    /// Returns the identity provider's structured error for the caller
    /// to render; nothing is retried automatically.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down.
    pub async fn sign_in(&self, email: &str, password: &str) -> PorchkitResult<()> {
        self.ensure_active();
        self.identity.sign_in(email, password).await
    }

    /// Signs out: issues the provider sign-out as a best-effort
    /// background task and redirects to the root screen immediately,
    /// exactly once per call.
    ///
    /// The redirect deliberately does not wait for the provider call or
    /// the confirmed signed-out state — a redirected screen may briefly
    /// observe stale user data before the `None` event lands. Responsive
    /// navigation wins over strict state-then-navigate ordering here.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down, or if called outside a
    /// tokio runtime.
    pub fn sign_out(&self) {
        self.ensure_active();
        let identity = Arc::clone(&self.identity);
        tokio::spawn(async move {
            if let Err(err) = identity.sign_out().await {
                warn!("sign-out request failed: {err}");
            }
        });
        self.navigator.redirect_to_root();
    }

    /// Persists the set fields of `update` on the account profile,
    /// merging them into the in-memory user immediately — the one place
    /// where state is written outside the session-change stream. When no
    /// user is resolved the merge is a no-op.
    ///
    /// The remote persist is best-effort: a failure is logged and the
    /// optimistic state stands until the provider says otherwise.
    ///
    /// # Panics
    ///
    /// Panics if the manager has been shut down.
    pub async fn update_profile(&self, update: &ProfileUpdate) {
        self.ensure_active();
        self.state.send_if_modified(|state| {
            let Some(user) = state.user.as_mut() else {
                return false;
            };
            user.merge(update);
            true
        });
        if let Err(err) = self.identity.update_profile(update).await {
            warn!("profile update failed; keeping optimistic state: {err}");
        }
    }

    /// Releases the session-change subscription and deactivates the
    /// manager. Idempotent; after the first call every operation and
    /// state accessor panics.
    ///
    /// Dropping the manager without calling this also releases the
    /// subscription — no exit path leaks it.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut subscription) = subscription {
            subscription.release();
        }
    }

    fn ensure_active(&self) {
        assert!(
            self.active.load(Ordering::Acquire),
            "session manager used outside its active lifetime (after shutdown)"
        );
    }
}

/// Applies a session resolution: projects the payload (if any) and
/// unconditionally clears `loading`. Used for both bootstrap completion
/// and every session-change event, which makes the two commutative with
/// respect to `loading` and last-write-wins on `user`.
fn apply_resolution(
    state: &watch::Sender<SessionState>,
    payload: Option<SessionPayload>,
) {
    let user = payload.as_ref().map(User::from_payload);
    state.send_replace(SessionState {
        user,
        loading: false,
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::PorchkitError;

    use super::*;

    /// What the fake's `bootstrap_session` should do.
    enum Bootstrap {
        Absent,
        Payload(SessionPayload),
        Fail,
        /// Never resolves; lets tests drive state purely through events.
        Pending,
    }

    struct FakeIdentity {
        bootstrap: Bootstrap,
        handler: Arc<Mutex<Option<Arc<dyn Fn(Option<SessionPayload>) + Send + Sync>>>>,
        releases: Arc<AtomicUsize>,
        sign_out_calls: Arc<AtomicUsize>,
        /// When set, `sign_out` never completes after being counted.
        sign_out_hangs: bool,
        update_fails: bool,
    }

    impl FakeIdentity {
        fn new(bootstrap: Bootstrap) -> Self {
            Self {
                bootstrap,
                handler: Arc::new(Mutex::new(None)),
                releases: Arc::new(AtomicUsize::new(0)),
                sign_out_calls: Arc::new(AtomicUsize::new(0)),
                sign_out_hangs: false,
                update_fails: false,
            }
        }

        /// Delivers a session-change event to the registered handler.
        fn emit(&self, payload: Option<SessionPayload>) {
            let handler = self.handler.lock().unwrap().clone();
            handler.expect("handler registered")(payload);
        }

        fn network_error() -> PorchkitError {
            PorchkitError::NetworkError {
                url: "https://identity.test".to_string(),
                status: None,
                error: "connection reset".to_string(),
            }
        }
    }

    #[async_trait]
    impl IdentityClient for FakeIdentity {
        async fn bootstrap_session(&self) -> PorchkitResult<Option<SessionPayload>> {
            match &self.bootstrap {
                Bootstrap::Absent => Ok(None),
                Bootstrap::Payload(payload) => Ok(Some(payload.clone())),
                Bootstrap::Fail => Err(Self::network_error()),
                Bootstrap::Pending => std::future::pending().await,
            }
        }

        fn subscribe_to_session_changes(
            &self,
            handler: crate::identity::SessionChangeHandler,
        ) -> SessionSubscription {
            *self.handler.lock().unwrap() = Some(Arc::from(handler));
            let slot = Arc::clone(&self.handler);
            let releases = Arc::clone(&self.releases);
            SessionSubscription::new(move || {
                slot.lock().unwrap().take();
                releases.fetch_add(1, Ordering::SeqCst);
            })
        }

        async fn sign_up(&self, _email: &str, _password: &str) -> PorchkitResult<()> {
            Ok(())
        }

        async fn sign_in(&self, _email: &str, _password: &str) -> PorchkitResult<()> {
            Ok(())
        }

        async fn sign_out(&self) -> PorchkitResult<()> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            if self.sign_out_hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn update_profile(&self, _update: &ProfileUpdate) -> PorchkitResult<()> {
            if self.update_fails {
                Err(Self::network_error())
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        root_redirects: AtomicUsize,
        home_redirects: AtomicUsize,
    }

    impl Navigator for RecordingNavigator {
        fn redirect_to_root(&self) {
            self.root_redirects.fetch_add(1, Ordering::SeqCst);
        }

        fn redirect_to_home(&self) {
            self.home_redirects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn payload(id: &str, email: &str, name: Option<&str>) -> SessionPayload {
        let metadata = name.map_or_else(HashMap::new, |name| {
            HashMap::from([("name".to_string(), json!(name))])
        });
        SessionPayload {
            id: id.to_string(),
            email: Some(email.to_string()),
            metadata,
        }
    }

    fn start(
        identity: FakeIdentity,
    ) -> (
        Arc<SessionManager>,
        Arc<FakeIdentity>,
        Arc<RecordingNavigator>,
    ) {
        let identity = Arc::new(identity);
        let navigator = Arc::new(RecordingNavigator::default());
        let manager = SessionManager::start(
            Arc::clone(&identity) as Arc<dyn IdentityClient>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        );
        (manager, identity, navigator)
    }

    /// Waits for the bootstrap/event race to settle and returns the
    /// resolved state.
    async fn resolved_state(manager: &SessionManager) -> SessionState {
        let mut rx = manager.watch();
        tokio::time::timeout(Duration::from_secs(1), async {
            while rx.borrow_and_update().loading {
                rx.changed().await.expect("state channel open");
            }
        })
        .await
        .expect("session resolved within timeout");
        manager.current()
    }

    #[tokio::test]
    async fn test_bootstrap_without_session_resolves_signed_out() {
        let (manager, _identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        let state = resolved_state(&manager).await;
        assert_eq!(state.user, None);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_bootstrap_with_session_projects_user() {
        let (manager, _identity, _navigator) = start(FakeIdentity::new(
            Bootstrap::Payload(payload("u1", "a@b.com", Some("A"))),
        ));
        let state = resolved_state(&manager).await;
        let user = state.user.expect("signed in");
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name.as_deref(), Some("A"));
        assert_eq!(user.avatar_url, None);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_resolves_signed_out_instead_of_hanging() {
        let (manager, _identity, _navigator) = start(FakeIdentity::new(Bootstrap::Fail));
        let state = resolved_state(&manager).await;
        assert_eq!(state.user, None);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_change_event_clears_loading_when_bootstrap_never_resolves() {
        let (manager, identity, _navigator) =
            start(FakeIdentity::new(Bootstrap::Pending));
        assert!(manager.current().loading);

        identity.emit(Some(payload("u1", "a@b.com", None)));

        let state = manager.current();
        assert!(!state.loading);
        assert_eq!(state.user.expect("signed in").id, "u1");
    }

    #[tokio::test]
    async fn test_sign_in_then_event_transitions_without_reentering_loading() {
        let (manager, identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        let state = resolved_state(&manager).await;
        assert_eq!(state.user, None);

        manager.sign_in("a@b.com", "hunter2").await.unwrap();
        // No synchronous state change; the event is the transition.
        assert_eq!(manager.current().user, None);
        assert!(!manager.current().loading);

        identity.emit(Some(payload("u1", "a@b.com", None)));
        let state = manager.current();
        assert_eq!(state.user.expect("signed in").id, "u1");
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_rapid_events_last_write_wins() {
        let (manager, identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        resolved_state(&manager).await;

        identity.emit(Some(payload("u1", "x@b.com", Some("X"))));
        identity.emit(Some(payload("u2", "y@b.com", Some("Y"))));

        let user = manager.current().user.expect("signed in");
        assert_eq!(user.id, "u2");
        assert_eq!(user.email, "y@b.com");
        assert_eq!(user.name.as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn test_event_without_payload_signs_out() {
        let (manager, identity, _navigator) = start(FakeIdentity::new(
            Bootstrap::Payload(payload("u1", "a@b.com", None)),
        ));
        resolved_state(&manager).await;

        identity.emit(None);
        let state = manager.current();
        assert_eq!(state.user, None);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_sign_out_redirects_immediately_while_request_pending() {
        let mut identity = FakeIdentity::new(Bootstrap::Payload(payload(
            "u1", "a@b.com", None,
        )));
        identity.sign_out_hangs = true;
        let (manager, identity, navigator) = start(identity);
        resolved_state(&manager).await;

        manager.sign_out();
        assert_eq!(navigator.root_redirects.load(Ordering::SeqCst), 1);
        assert_eq!(navigator.home_redirects.load(Ordering::SeqCst), 0);

        // Give the spawned request time to start; it never completes,
        // yet the redirect already happened and state is untouched.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(identity.sign_out_calls.load(Ordering::SeqCst), 1);
        assert!(manager.current().user.is_some());
        assert_eq!(navigator.root_redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_profile_merges_optimistically_and_survives_failure() {
        let mut identity = FakeIdentity::new(Bootstrap::Payload(payload(
            "u1", "a@b.com", Some("A"),
        )));
        identity.update_fails = true;
        let (manager, _identity, _navigator) = start(identity);
        resolved_state(&manager).await;

        manager
            .update_profile(&ProfileUpdate {
                name: Some("New".to_string()),
                avatar_url: None,
            })
            .await;

        let user = manager.current().user.expect("signed in");
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn test_update_profile_is_noop_when_signed_out() {
        let (manager, _identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        resolved_state(&manager).await;

        manager
            .update_profile(&ProfileUpdate {
                name: Some("New".to_string()),
                avatar_url: None,
            })
            .await;

        assert_eq!(manager.current().user, None);
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription_once() {
        let (manager, identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        resolved_state(&manager).await;

        manager.shutdown();
        manager.shutdown();
        assert_eq!(identity.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_without_shutdown_releases_subscription() {
        let identity = Arc::new(FakeIdentity::new(Bootstrap::Absent));
        let navigator = Arc::new(RecordingNavigator::default());
        {
            let manager = SessionManager::start(
                Arc::clone(&identity) as Arc<dyn IdentityClient>,
                Arc::clone(&navigator) as Arc<dyn Navigator>,
            );
            resolved_state(&manager).await;
        }
        assert_eq!(identity.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[should_panic(expected = "session manager used outside its active lifetime")]
    async fn test_use_after_shutdown_panics() {
        let (manager, _identity, _navigator) = start(FakeIdentity::new(Bootstrap::Absent));
        resolved_state(&manager).await;

        manager.shutdown();
        let _ = manager.current();
    }
}
