//! Shared HTTP client, failure classification, and the retry loop.
//!
//! # Design
//! - Every remote call goes through [`Transport::with_retry`]; only failures
//!   flagged retryable (timeouts, connection resets, 408/429/5xx) are retried.
//! - Application-level rejections and decode failures surface immediately.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::warn;
use wscopy_core::{ServiceError, ServiceResult};
use wscopy_telemetry::Metrics;

use crate::retry::RetryPolicy;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client plus retry policy shared by every service client of one run.
#[derive(Clone)]
pub struct Transport {
    http: Client,
    retry: RetryPolicy,
    metrics: Option<Metrics>,
}

impl Transport {
    /// Wrap an existing client.
    #[must_use]
    pub const fn new(http: Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            metrics: None,
        }
    }

    /// Build a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying error when the TLS backend cannot be initialised.
    pub fn build(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wscopy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(http, retry))
    }

    /// Count retries into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Underlying HTTP client.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    /// Active retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last failure produced by `op`.
    pub async fn with_retry<T, F, Fut>(
        &self,
        service: &'static str,
        method: &str,
        mut op: F,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.jittered_delay_for(attempt);
                    warn!(
                        service,
                        method,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient failure; retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_transport_retry(service);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Map a failure to send or read a request.
pub(crate) fn request_error(
    service: &'static str,
    method: &str,
    error: &reqwest::Error,
) -> ServiceError {
    let status = error.status();
    ServiceError::Transport {
        service,
        method: method.to_string(),
        status: status.map(|code| code.as_u16()),
        retryable: error.is_timeout()
            || error.is_connect()
            || error.is_request()
            || error.is_body()
            || status.is_some_and(retryable_status),
        detail: error.to_string(),
    }
}

/// Map a non-success HTTP status.
pub(crate) fn status_error(
    service: &'static str,
    method: &str,
    status: StatusCode,
    body: &[u8],
) -> ServiceError {
    let text = String::from_utf8_lossy(body);
    let snippet: String = text.trim().chars().take(200).collect();
    ServiceError::Transport {
        service,
        method: method.to_string(),
        status: Some(status.as_u16()),
        retryable: retryable_status(status),
        detail: if snippet.is_empty() {
            format!("request failed with status {status}")
        } else {
            format!("{snippet} (status {status})")
        },
    }
}

/// Statuses worth retrying.
pub(crate) fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}
