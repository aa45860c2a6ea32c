//! Identity provider seam and subscription lifecycle.
//!
//! The remote identity service is an opaque collaborator: the session
//! manager only sees the [`IdentityClient`] operations and the stream of
//! session-change events delivered through a registered handler.

mod http;
pub use http::HttpIdentityClient;

use async_trait::async_trait;

use crate::{PorchkitResult, ProfileUpdate, SessionPayload};

/// Callback invoked for every session change the provider reports:
/// `Some(payload)` on sign-in and token refresh, `None` on sign-out or
/// session invalidation. Handlers are called in event-arrival order.
pub type SessionChangeHandler = Box<dyn Fn(Option<SessionPayload>) + Send + Sync>;

/// Remote identity service abstraction.
///
/// Implementations own all credential persistence internally (via the
/// host's secure store); callers never see tokens, only
/// [`SessionPayload`] values and result codes.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Resolves the current session once, typically from persisted
    /// credentials. Returns `None` when nothing (valid) is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or a required
    /// refresh round trip fails.
    async fn bootstrap_session(&self) -> PorchkitResult<Option<SessionPayload>>;

    /// Registers a durable listener for session changes. The handler may
    /// be invoked any number of times until the returned subscription is
    /// released.
    fn subscribe_to_session_changes(
        &self,
        handler: SessionChangeHandler,
    ) -> SessionSubscription;

    /// Creates an account with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PorchkitError::Auth`] when the provider rejects
    /// the request, or a network error.
    async fn sign_up(&self, email: &str, password: &str) -> PorchkitResult<()>;

    /// Authenticates with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PorchkitError::Auth`] when the provider rejects
    /// the credentials, or a network error.
    async fn sign_in(&self, email: &str, password: &str) -> PorchkitResult<()>;

    /// Terminates the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider round trip fails; local session
    /// state is discarded regardless.
    async fn sign_out(&self) -> PorchkitResult<()>;

    /// Persists the set fields of `update` on the account profile.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active session or the provider
    /// round trip fails.
    async fn update_profile(&self, update: &ProfileUpdate) -> PorchkitResult<()>;
}

/// Ownership token for a registered session-change listener.
///
/// Exactly one subscription exists per session manager; releasing it is
/// idempotent, and dropping an unreleased token releases it, so no exit
/// path leaks the registration.
pub struct SessionSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl SessionSubscription {
    /// Wraps the provider-side unsubscribe action.
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Releases the underlying listener registration. Safe to call more
    /// than once; only the first call runs the unsubscribe action.
    pub fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("released", &self.unsubscribe.is_none())
            .finish()
    }
}
