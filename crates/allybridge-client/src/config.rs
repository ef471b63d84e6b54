//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Portal root used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://pm.officeally.com/emr";

/// Browser identity presented to the portal. The portal serves a reduced
/// markup variant to clients it does not recognize, so this stays pinned
/// to a mainstream desktop profile.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default progress-note layout opened by the note editor.
pub const DEFAULT_SOAP_LAYOUT_ID: &str = "347185";

/// Invalid configuration detected before any request is made.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid client configuration: {0}")]
pub struct ConfigError(String);

impl ConfigError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Tunables for talking to the portal.
///
/// Defaults reproduce the portal contract observed in production traffic.
/// Override `base_url` to point at a test double.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Portal root every request path is joined to. No trailing slash.
    pub base_url: String,
    /// Per-exchange timeout covering connect, send and body read.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Total attempts for idempotent exchanges (first try included).
    /// Submission posts always run exactly once regardless of this value.
    pub max_attempts: u32,
    /// Base delay between attempts. Doubles after each failure.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Redirect hops followed per exchange before giving up.
    pub max_redirects: u32,
    /// User-Agent header for every request.
    pub user_agent: String,
    /// Layout identifier passed to the note editor when creating notes.
    pub soap_layout_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60), // matches the portal's slowest pages
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            soap_layout_id: DEFAULT_SOAP_LAYOUT_ID.to_string(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_soap_layout_id(mut self, layout_id: impl Into<String>) -> Self {
        self.soap_layout_id = layout_id.into();
        self
    }

    /// Checks the configuration and returns the parsed portal root.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::new(format!("base_url is not a valid URL: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::new(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.max_attempts == 0 || self.max_attempts > 3 {
            return Err(ConfigError::new(format!(
                "max_attempts must be between 1 and 3, got {}",
                self.max_attempts
            )));
        }
        if self.max_redirects == 0 {
            return Err(ConfigError::new("max_redirects must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::new("request_timeout must be non-zero"));
        }
        if self.soap_layout_id.is_empty() || !self.soap_layout_id.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ConfigError::new(
                "soap_layout_id must be a non-empty numeric identifier",
            ));
        }
        Ok(url)
    }
}
