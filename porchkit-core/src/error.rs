use thiserror::Error;

/// Error outputs from the Porchkit session core.
///
/// Programming errors (using the session manager outside its active
/// lifetime) are deliberately not part of this taxonomy; they panic so
/// misuse is caught during development instead of degrading silently.
#[derive(Debug, Error)]
pub enum PorchkitError {
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending input.
        attribute: String,
        /// Why the input was rejected.
        reason: String,
    },
    /// The identity provider rejected the request (bad credentials,
    /// duplicate account, expired refresh token, ...). Screens render
    /// `message` to the user.
    #[error("auth_error ({status}): {message}")]
    Auth {
        /// HTTP status returned by the provider.
        status: u16,
        /// Human-readable description from the provider's error body.
        message: String,
    },
    /// Network failure after retries were exhausted.
    #[error("network_error for {url} (status: {status:?}): {error}")]
    NetworkError {
        /// URL of the failed request.
        url: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Failure details.
        error: String,
    },
    /// HTTP request failure.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Unexpected error serializing or deserializing information.
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Failure details.
        error: String,
    },
    /// Errors coming from the host platform's secure store.
    #[error("secure_store_error: {error}")]
    SecureStore {
        /// Failure details as reported by the platform.
        error: String,
    },
}
