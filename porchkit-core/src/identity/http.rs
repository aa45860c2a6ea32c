//! HTTP client for the hosted identity service.
//!
//! Speaks the provider's REST auth surface and owns every piece of
//! session persistence: tokens live in the host [`SecureStore`] as one
//! JSON record under a fixed key, and nothing outside this module reads
//! or writes them. Session-change events are fanned out synchronously,
//! in order, to the handlers registered through
//! [`IdentityClient::subscribe_to_session_changes`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::http_request::Request;
use crate::store::SecureStore;
use crate::{IdentityConfig, PorchkitError, PorchkitResult, ProfileUpdate, SessionPayload};

use super::{IdentityClient, SessionChangeHandler, SessionSubscription};

/// Secure-store key for the persisted session record.
const SESSION_STORE_KEY: &str = "porchkit.session";

/// Header carrying the publishable API key on every request.
const API_KEY_HEADER: &str = "apikey";

/// Seconds before nominal expiry at which a stored access token is
/// treated as expired, covering clock skew and the round trip itself.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Registered session-change callback.
type HandlerFn = dyn Fn(Option<SessionPayload>) + Send + Sync;

/// Session record persisted in the secure store between launches.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    /// Unix timestamp (seconds) past which `access_token` is invalid.
    expires_at: u64,
    user: SessionPayload,
}

impl StoredSession {
    const fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now.saturating_add(EXPIRY_MARGIN_SECS)
    }
}

/// Wire shape of the provider's token grant response.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    user: SessionPayload,
}

/// Wire shape of the provider's error bodies, which vary by endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error_description", alias = "msg")]
    message: Option<String>,
}

/// Production [`IdentityClient`] backed by the provider's REST API.
pub struct HttpIdentityClient {
    config: IdentityConfig,
    request: Request,
    store: Arc<dyn SecureStore>,
    handlers: Arc<Mutex<Vec<(u64, Arc<HandlerFn>)>>>,
    next_handler_id: AtomicU64,
}

impl HttpIdentityClient {
    /// Creates a client for the given backend, persisting sessions in
    /// `store`.
    #[must_use]
    pub fn new(config: IdentityConfig, store: Arc<dyn SecureStore>) -> Self {
        Self {
            config,
            request: Request::new(),
            store,
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_handler_id: AtomicU64::new(0),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.base_url)
    }

    /// Calls every registered handler with `payload`, in registration
    /// order, without holding the handler lock during the calls.
    fn emit(&self, payload: Option<SessionPayload>) {
        let handlers: Vec<Arc<HandlerFn>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    async fn load_session(&self) -> PorchkitResult<Option<StoredSession>> {
        let Some(bytes) = self.store.get(SESSION_STORE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!("discarding unreadable stored session: {err}");
                if let Err(err) = self.store.delete(SESSION_STORE_KEY).await {
                    warn!("failed to clear unreadable stored session: {err}");
                }
                Ok(None)
            }
        }
    }

    async fn persist_session(&self, session: &StoredSession) -> PorchkitResult<()> {
        let bytes = serde_json::to_vec(session).map_err(|err| {
            PorchkitError::SerializationError {
                error: err.to_string(),
            }
        })?;
        self.store.set(SESSION_STORE_KEY, bytes).await
    }

    /// Persists a fresh token grant and returns its session payload.
    async fn store_grant(&self, grant: TokenGrant) -> PorchkitResult<SessionPayload> {
        let session = StoredSession {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: current_unix_timestamp().saturating_add(grant.expires_in),
            user: grant.user,
        };
        self.persist_session(&session).await?;
        Ok(session.user)
    }

    /// Exchanges the stored refresh token for a new grant and republishes
    /// the session.
    async fn refresh_session(
        &self,
        session: StoredSession,
    ) -> PorchkitResult<SessionPayload> {
        debug!("refreshing expired session");
        let body = serde_json::json!({ "refresh_token": session.refresh_token });
        let builder = self
            .request
            .post(&self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body);
        let response = ok_or_auth_error(self.request.handle(builder).await?).await?;
        let grant: TokenGrant = response.json().await?;
        let payload = self.store_grant(grant).await?;
        self.emit(Some(payload.clone()));
        Ok(payload)
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn bootstrap_session(&self) -> PorchkitResult<Option<SessionPayload>> {
        let Some(session) = self.load_session().await? else {
            return Ok(None);
        };
        if !session.is_expired(current_unix_timestamp()) {
            return Ok(Some(session.user));
        }
        match self.refresh_session(session).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err @ PorchkitError::Auth { .. }) => {
                // The provider rejected the refresh token; the stored
                // session is dead and must not be retried next launch.
                warn!("stored session rejected during bootstrap: {err}");
                if let Err(err) = self.store.delete(SESSION_STORE_KEY).await {
                    warn!("failed to clear rejected stored session: {err}");
                }
                Ok(None)
            }
            Err(err) => {
                // Transient failure: resolve signed-out for this launch
                // but keep the stored session for the next one.
                warn!("session refresh failed during bootstrap: {err}");
                Ok(None)
            }
        }
    }

    fn subscribe_to_session_changes(
        &self,
        handler: SessionChangeHandler,
    ) -> SessionSubscription {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let handler: Arc<HandlerFn> = Arc::from(handler);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));

        let handlers = Arc::clone(&self.handlers);
        SessionSubscription::new(move || {
            handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(handler_id, _)| *handler_id != id);
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> PorchkitResult<()> {
        validate_credentials(email, password)?;
        let body = serde_json::json!({ "email": email, "password": password });
        let builder = self
            .request
            .post(&self.auth_url("signup"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body);
        let response = ok_or_auth_error(self.request.handle(builder).await?).await?;

        // Backends with auto-confirmation answer with a full grant; the
        // email-confirmation flow answers with a bare user object and the
        // session arrives only after the user confirms.
        let value: serde_json::Value = response.json().await?;
        if let Ok(grant) = serde_json::from_value::<TokenGrant>(value) {
            let payload = self.store_grant(grant).await?;
            self.emit(Some(payload));
        }
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> PorchkitResult<()> {
        validate_credentials(email, password)?;
        let body = serde_json::json!({ "email": email, "password": password });
        let builder = self
            .request
            .post(&self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body);
        let response = ok_or_auth_error(self.request.handle(builder).await?).await?;
        let grant: TokenGrant = response.json().await?;
        let payload = self.store_grant(grant).await?;
        self.emit(Some(payload));
        Ok(())
    }

    async fn sign_out(&self) -> PorchkitResult<()> {
        let stored = self.load_session().await.unwrap_or_else(|err| {
            warn!("failed to read stored session during sign-out: {err}");
            None
        });

        // The local session is discarded and the sign-out event is
        // published before the server round trip: the account is signed
        // out on this device no matter what the server answers.
        if let Err(err) = self.store.delete(SESSION_STORE_KEY).await {
            warn!("failed to clear stored session: {err}");
        }
        self.emit(None);

        if let Some(session) = stored {
            let builder = self
                .request
                .post(&self.auth_url("logout"))
                .header(API_KEY_HEADER, &self.config.api_key)
                .bearer_auth(&session.access_token);
            ok_or_auth_error(self.request.handle(builder).await?).await?;
        }
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> PorchkitResult<()> {
        let Some(mut session) = self.load_session().await? else {
            return Err(PorchkitError::Auth {
                status: 401,
                message: "no active session".to_string(),
            });
        };

        let mut data = serde_json::Map::new();
        if let Some(name) = &update.name {
            data.insert("name".to_string(), serde_json::json!(name));
        }
        if let Some(avatar_url) = &update.avatar_url {
            data.insert("avatar_url".to_string(), serde_json::json!(avatar_url));
        }
        let body = serde_json::json!({ "data": data });

        let builder = self
            .request
            .put(&self.auth_url("user"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .bearer_auth(&session.access_token)
            .json(&body);
        let response = ok_or_auth_error(self.request.handle(builder).await?).await?;

        let payload: SessionPayload = response.json().await?;
        session.user = payload.clone();
        self.persist_session(&session).await?;
        self.emit(Some(payload));
        Ok(())
    }
}

/// Rejects obviously malformed credentials before the network round
/// trip. The provider stays the authority on everything else.
fn validate_credentials(email: &str, password: &str) -> PorchkitResult<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(PorchkitError::InvalidInput {
            attribute: "email".to_string(),
            reason: "not a valid email address".to_string(),
        });
    }
    if password.is_empty() {
        return Err(PorchkitError::InvalidInput {
            attribute: "password".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Converts non-success responses into [`PorchkitError::Auth`] carrying
/// the provider's message.
async fn ok_or_auth_error(response: Response) -> PorchkitResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| "unexpected identity provider error".to_string());
    Err(PorchkitError::Auth {
        status: status.as_u16(),
        message,
    })
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
