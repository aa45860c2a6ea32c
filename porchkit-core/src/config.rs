use strum::EnumString;

/// Deployment environment the app points at. Generally a client build
/// targets a single environment.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Pre-production backend used by internal builds.
    Staging,
    /// The live backend.
    Production,
}

/// Publishable API key for the staging project. Safe to embed in clients.
const STAGING_API_KEY: &str = "pk_staging_4f8a1c90b2d34e7aa6c1";

/// Publishable API key for the production project. Safe to embed in clients.
const PRODUCTION_API_KEY: &str = "pk_live_9d27e5b13fa84c02b8e4";

/// Connection settings for the hosted identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Base URL of the backend project, without a trailing slash.
    pub base_url: String,
    /// Publishable API key sent with every request.
    pub api_key: String,
}

impl IdentityConfig {
    /// Settings for one of the hosted environments.
    #[must_use]
    pub fn for_environment(environment: &Environment) -> Self {
        match environment {
            Environment::Staging => Self {
                base_url: "https://staging.api.porchkit.app".to_string(),
                api_key: STAGING_API_KEY.to_string(),
            },
            Environment::Production => Self {
                base_url: "https://api.porchkit.app".to_string(),
                api_key: PRODUCTION_API_KEY.to_string(),
            },
        }
    }

    /// Settings for a self-hosted or local development backend.
    #[must_use]
    pub fn custom(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: api_key.into(),
        }
    }
}
