use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::PorchkitError;

/// A thin wrapper on an HTTP client used for all identity-service calls.
/// Sets sensible defaults (timeout, user-agent, TLS-only endpoints with a
/// loopback exemption for local development backends) and retries
/// transient failures with exponential backoff.
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: usize,
}

impl Request {
    /// Initializes a new `Request` instance.
    pub(crate) fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3, // total attempts = 4
        }
    }

    /// Creates a request builder with defaults applied.
    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        assert!(
            is_permitted_url(url),
            "identity endpoints must use https (loopback exempt): {url}"
        );

        self.client.request(method, url).timeout(self.timeout).header(
            "User-Agent",
            format!("porchkit-core/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Creates a PUT request builder with defaults applied.
    pub(crate) fn put(&self, url: &str) -> RequestBuilder {
        self.req(Method::PUT, url)
    }

    /// Sends a request built by `post`/`put`, retrying transient failures.
    ///
    /// Responses with non-retryable error statuses (4xx) are returned to
    /// the caller for interpretation; retryable statuses (429, 5xx) and
    /// timeout/connect failures are retried until the budget runs out and
    /// then surface as [`PorchkitError::NetworkError`].
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, PorchkitError> {
        // Streaming bodies cannot be cloned for a retry; send them once.
        let Some(template) = request_builder.try_clone() else {
            return dispatch(request_builder).await.map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                AttemptError::new(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                    false,
                )
            })?;
            dispatch(request_builder).await
        })
        .retry(backoff)
        .when(AttemptError::is_retryable)
        .await
        .map_err(Into::into)
    }
}

/// Loopback endpoints are allowed plain HTTP so local development
/// backends and test servers work; everything else must be HTTPS.
fn is_permitted_url(url: &str) -> bool {
    url.starts_with("https://")
        || url.starts_with("http://127.0.0.1")
        || url.starts_with("http://localhost")
}

/// A single failed send attempt, classified for the retry policy.
#[derive(Debug)]
struct AttemptError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl AttemptError {
    const fn new(url: String, status: Option<u16>, error: String, retryable: bool) -> Self {
        Self {
            url,
            status,
            error,
            retryable,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<AttemptError> for PorchkitError {
    fn from(value: AttemptError) -> Self {
        Self::NetworkError {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn dispatch(request_builder: RequestBuilder) -> Result<Response, AttemptError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        AttemptError::new(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
            false,
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(AttemptError::new(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                    true,
                ));
            }
            Ok(response)
        }
        Err(err) => {
            let retryable = err.is_timeout() || err.is_connect();
            Err(AttemptError::new(
                url,
                None,
                format!("request failed: {err}"),
                retryable,
            ))
        }
    }
}
