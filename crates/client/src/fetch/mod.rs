//! HTTPS retrieval with trust validation, timeouts, and bounded retry.
//!
//! ### Address canonicalization
//! - Trim whitespace, require an absolute http(s) address
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Safety gates
//! - rustls TLS with certificate-chain validation against the deployment's
//!   trust roots
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! ### Retry
//! Transient failures (connection failures, 5xx, 429) are retried with
//! exponential backoff up to a fixed attempt ceiling. Timeouts, TLS
//! validation failures, and 4xx responses surface immediately.

pub mod retry;
pub mod url;

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::error::Error as _;
use std::time::Duration;

pub use retry::RetryPolicy;
pub use url::{UrlError, canonicalize};

use async_trait::async_trait;
use shaft_core::AppConfig;

/// Errors from a fetch attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The per-call timeout elapsed. Not retried.
    #[error("fetch timed out")]
    Timeout,

    /// Connection-level failure (refused, reset, DNS). Retried.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Certificate chain validation failed. Not retried.
    #[error("TLS validation failed: {0}")]
    TlsValidationFailed(String),

    /// Server-side error status (5xx, 429). Retried.
    #[error("remote transient error: status {status}")]
    RemoteTransient { status: u16 },

    /// Client-side error status (4xx). Not retried.
    #[error("remote permanent error: status {status}")]
    RemotePermanent { status: u16 },

    /// Response body exceeds the configured ceiling. Not retried.
    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Address failed canonicalization. Not retried.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::ConnectionFailed(_) | FetchError::RemoteTransient { .. })
    }
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shaft/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Per-attempt request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Retry schedule for transient failures.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "shaft/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20_000),
            max_redirects: 5,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Derive a fetch configuration from the loaded application config.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1),
                base_delay: Duration::from_millis(config.retry_backoff_ms),
            },
        }
    }
}

/// A successfully fetched resource body.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Bytes,
    /// Upstream `ETag` header, when present.
    pub etag: Option<String>,
}

/// Retrieval capability consumed by the cache engine.
///
/// Implementations must be stateless across calls; caching is entirely the
/// engine's responsibility.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<Fetched, FetchError>;
}

/// HTTPS fetch client with retry.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::ConnectionFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_once(&self, url: &reqwest::Url) -> Result<Fetched, FetchError> {
        let response = self
            .http
            .get(url.clone())
            .header("Accept", "*/*")
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(FetchError::TooLarge { size: len as usize, limit: self.config.max_bytes });
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge { size: bytes.len(), limit: self.config.max_bytes });
        }

        Ok(Fetched { bytes, etag })
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    /// Fetch an address, retrying transient failures with bounded backoff.
    async fn fetch(&self, address: &str) -> Result<Fetched, FetchError> {
        let url = canonicalize(address).map_err(|e| FetchError::InvalidAddress(e.to_string()))?;
        let fetched = retry::with_retry(&self.config.retry, || self.fetch_once(&url)).await?;
        tracing::debug!(url = %url, bytes = fetched.bytes.len(), "fetch succeeded");
        Ok(fetched)
    }
}

fn classify_status(status: StatusCode) -> FetchError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::RemoteTransient { status: status.as_u16() }
    } else {
        FetchError::RemotePermanent { status: status.as_u16() }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }

    // reqwest does not expose TLS failures as a distinct kind; walk the
    // source chain for the rustls certificate error instead.
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if text.contains("certificate") || text.contains("UnknownIssuer") {
            return FetchError::TlsValidationFailed(text);
        }
        source = inner.source();
    }

    FetchError::ConnectionFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "shaft/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_fetch_config_from_app() {
        let app = AppConfig { max_retries: 0, retry_backoff_ms: 500, ..Default::default() };
        let config = FetchConfig::from_app(&app);
        // A zero retry ceiling still allows the initial attempt.
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address_surfaces_immediately() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let result = client.fetch("ftp://example.com/resource").await;
        assert!(matches!(result, Err(FetchError::InvalidAddress(_))));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            FetchError::RemoteTransient { status: 500 }
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            FetchError::RemoteTransient { status: 429 }
        ));
        assert!(matches!(classify_status(StatusCode::NOT_FOUND), FetchError::RemotePermanent { status: 404 }));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FetchError::ConnectionFailed("reset".into()).is_transient());
        assert!(FetchError::RemoteTransient { status: 503 }.is_transient());
        assert!(!FetchError::Timeout.is_transient());
        assert!(!FetchError::TlsValidationFailed("bad chain".into()).is_transient());
        assert!(!FetchError::RemotePermanent { status: 404 }.is_transient());
    }
}
