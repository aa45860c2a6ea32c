use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key under which the provider stores the display name.
const METADATA_NAME: &str = "name";

/// Metadata key under which the provider stores the avatar URL.
const METADATA_AVATAR_URL: &str = "avatar_url";

/// Raw record with which the identity provider describes an
/// authenticated account. Consumed fields only; everything else in the
/// provider's user object is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Opaque stable account identifier.
    pub id: String,
    /// Account email, when the provider knows one.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form profile metadata (`name`, `avatar_url`, ...).
    #[serde(default, rename = "user_metadata")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionPayload {
    /// Reads a string-valued metadata field, ignoring non-string values.
    fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
    }
}

/// The normalized identity projection exposed to the application.
///
/// Constructed exclusively by the session manager from a
/// [`SessionPayload`]; screens only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque stable identifier, unique per underlying account.
    pub id: String,
    /// Account email. Empty string when the provider has none — never
    /// absent, so screens can render it without a fallback branch.
    pub email: String,
    /// Display name from provider-side metadata, if set.
    pub name: Option<String>,
    /// Avatar URL from provider-side metadata, if set.
    pub avatar_url: Option<String>,
}

impl User {
    /// Projects a raw session payload into the normalized user shape.
    ///
    /// Pure and total: never fails for a well-formed payload. `id` and
    /// `email` are copied verbatim (`email` defaults to empty string),
    /// `name`/`avatar_url` come from metadata when present.
    #[must_use]
    pub fn from_payload(payload: &SessionPayload) -> Self {
        Self {
            id: payload.id.clone(),
            email: payload.email.clone().unwrap_or_default(),
            name: payload.metadata_str(METADATA_NAME),
            avatar_url: payload.metadata_str(METADATA_AVATAR_URL),
        }
    }

    /// Applies the set fields of `update` over this user, leaving unset
    /// fields untouched. This is the optimistic-merge half of
    /// profile updates; the authoritative value arrives later via the
    /// session-change stream.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name = Some(name.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
    }
}

impl From<&SessionPayload> for User {
    fn from(payload: &SessionPayload) -> Self {
        Self::from_payload(payload)
    }
}

/// Partial profile fields sent to the identity provider by
/// `update_profile`. Unset fields are left unchanged on the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name, if changing.
    pub name: Option<String>,
    /// New avatar URL, if changing.
    pub avatar_url: Option<String>,
}
