//! HTTP transport against the portal.
//!
//! Redirect handling is deliberately manual: the portal signals session
//! expiry through `Location` targets, so every hop has to stay visible to
//! the caller instead of being swallowed by the HTTP client. The transport
//! records hops and leaves their interpretation to the orchestration layer.

use crate::config::ClientConfig;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Failure below the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("redirect chain exceeded {limit} hops")]
    TooManyRedirects { limit: u32 },

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and connection resets are worth another attempt.
    /// Everything else is not.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

/// Request body variants the portal accepts.
#[derive(Debug, Clone)]
pub(crate) enum ExchangeBody {
    /// Standard form-encoded pairs.
    Form(Vec<(String, String)>),
    /// Pre-serialized payload sent under an explicit content type. The
    /// portal's bridge endpoint expects raw JSON text under a
    /// form-urlencoded content type, so the two are decoupled here.
    Raw {
        content_type: &'static str,
        payload: String,
    },
}

/// One exchange to perform, redirects included.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<ExchangeBody>,
    /// When false the first redirect response is returned untouched with
    /// its `Location` captured. Submission posts rely on this.
    pub follow_redirects: bool,
    /// Total attempts. Anything above 1 re-runs the whole exchange after
    /// a transient failure.
    pub attempts: u32,
}

impl Exchange {
    pub(crate) fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            follow_redirects: true,
            attempts: 1,
        }
    }

    pub(crate) fn post(url: Url) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(url)
        }
    }
}

/// What the portal answered once redirects settled.
#[derive(Debug)]
pub(crate) struct PlatformResponse {
    pub status: StatusCode,
    /// URL that produced the final response.
    pub final_url: Url,
    /// Absolute targets of every redirect that was followed, in order.
    pub redirect_hops: Vec<String>,
    /// `Location` header of the final response, kept when it was a
    /// redirect that was not followed.
    pub location: Option<String>,
    pub body: String,
}

/// HTTP client bound to one cookie jar. A fresh transport means a fresh
/// portal session; cloning shares the jar.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: Client,
    max_redirects: u32,
    retry_backoff: Duration,
}

impl Transport {
    pub(crate) fn new(config: &ClientConfig) -> Self {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(Policy::none())
            .cookie_provider(Arc::new(Jar::default()))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            max_redirects: config.max_redirects,
            retry_backoff: config.retry_backoff,
        }
    }

    /// Runs the exchange, retrying transient failures up to the attempt
    /// budget with doubling delays.
    pub(crate) async fn execute(
        &self,
        exchange: &Exchange,
    ) -> Result<PlatformResponse, TransportError> {
        let attempts = exchange.attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.exchange_once(exchange).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.retry_backoff * (1 << attempt);
                    tracing::warn!(
                        method = %exchange.method,
                        url = %exchange.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange_once(&self, exchange: &Exchange) -> Result<PlatformResponse, TransportError> {
        let mut builder = self
            .http
            .request(exchange.method.clone(), exchange.url.clone())
            .headers(exchange.headers.clone());
        match &exchange.body {
            Some(ExchangeBody::Form(pairs)) => builder = builder.form(pairs),
            Some(ExchangeBody::Raw {
                content_type,
                payload,
            }) => {
                builder = builder
                    .header(CONTENT_TYPE, *content_type)
                    .body(payload.clone());
            }
            None => {}
        }

        tracing::debug!(method = %exchange.method, url = %exchange.url, "sending request");
        let mut response = builder.send().await.map_err(classify)?;

        let mut current_url = exchange.url.clone();
        let mut hops = Vec::new();
        if exchange.follow_redirects {
            while response.status().is_redirection() {
                let Some(target) = location_of(&response) else {
                    break;
                };
                let next = current_url
                    .join(&target)
                    .map_err(|e| TransportError::Other(format!("unresolvable redirect: {e}")))?;
                hops.push(next.to_string());
                if hops.len() as u32 > self.max_redirects {
                    return Err(TransportError::TooManyRedirects {
                        limit: self.max_redirects,
                    });
                }
                tracing::debug!(target = %next, hop = hops.len(), "following redirect");
                // The portal only ever issues 302s, and like a browser the
                // follow-up is always a plain GET.
                let mut hop_headers = exchange.headers.clone();
                hop_headers.remove(CONTENT_TYPE);
                response = self
                    .http
                    .get(next.clone())
                    .headers(hop_headers)
                    .send()
                    .await
                    .map_err(classify)?;
                current_url = next;
            }
        }

        let status = response.status();
        let final_url = response.url().clone();
        let location = location_of(&response);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(format!("failed to read response body: {e}")))?;
        tracing::debug!(status = status.as_u16(), url = %final_url, "exchange finished");

        Ok(PlatformResponse {
            status,
            final_url,
            redirect_hops: hops,
            location,
            body,
        })
    }
}

fn location_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
