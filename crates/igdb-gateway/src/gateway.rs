//! Outbound request execution with refresh-and-retry
//!
//! One `send()` call drives a small loop over attempts:
//!
//! ```text
//! Attempting -> Failed(reason) -> [Refreshing on 401] -> backoff -> Attempting
//!                              -> Terminal (success | UpstreamUnavailable)
//! ```
//!
//! A 401 triggers exactly one refresh before that request's retry. Several
//! concurrent requests hitting 401 each refresh independently: refresh is
//! idempotent and last-writer-wins, so the extra exchanges are tolerated
//! rather than deduplicated. All other failures go straight to backoff.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use igdb_auth::CredentialStore;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry and backoff configuration.
///
/// `retry_limit` counts retries after the initial attempt, so the gateway
/// makes at most `retry_limit + 1` attempts per `send()`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Delay for the retry after one that slept `current`: doubled, capped.
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

/// How a single attempt failed. Drives the refresh decision, the metrics
/// label, and the terminal error message.
enum AttemptFailure {
    Unauthorized,
    Timeout,
    Status(u16, String),
    Transport(String),
}

impl AttemptFailure {
    fn label(&self) -> &'static str {
        match self {
            AttemptFailure::Unauthorized => "unauthorized",
            AttemptFailure::Timeout => "timeout",
            AttemptFailure::Status(..) => "status",
            AttemptFailure::Transport(_) => "transport",
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Unauthorized => write!(f, "upstream rejected credentials (401)"),
            AttemptFailure::Timeout => write!(f, "upstream request timed out"),
            AttemptFailure::Status(status, body) => {
                write!(f, "upstream returned {status}: {body}")
            }
            AttemptFailure::Transport(msg) => write!(f, "upstream request failed: {msg}"),
        }
    }
}

/// Gateway to the IGDB query API.
///
/// Holds the shared credential store and the retry policy. Cheap to share
/// behind an `Arc`; all state mutated per-call lives on the stack.
pub struct UpstreamGateway {
    client: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl UpstreamGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            store,
            timeout,
            policy,
        }
    }

    /// Execute a query against an upstream endpoint (e.g. `games`,
    /// `popularity_primitives`) and return the response body untouched.
    pub async fn send(&self, endpoint: &str, query: &str) -> Result<Bytes> {
        let url = format!("{}/{}/", self.base_url.trim_end_matches('/'), endpoint);

        let mut retries = 0u32;
        let mut delay = self.policy.base_delay;

        loop {
            let attempt = retries + 1;
            let failure = match self.attempt(&url, endpoint, query).await {
                Ok(body) => {
                    debug!(endpoint, attempt, "upstream request succeeded");
                    metrics::counter!(
                        "igdb_requests_total",
                        "endpoint" => endpoint.to_string(),
                        "outcome" => "success"
                    )
                    .increment(1);
                    return Ok(body);
                }
                Err(failure) => failure,
            };

            warn!(endpoint, attempt, failure = %failure, "upstream request failed");
            metrics::counter!(
                "igdb_requests_total",
                "endpoint" => endpoint.to_string(),
                "outcome" => failure.label()
            )
            .increment(1);

            // Rejected credentials get one refresh before this request's
            // retry. A failed refresh propagates immediately; there is no
            // point retrying the query with a credential we cannot obtain.
            if matches!(failure, AttemptFailure::Unauthorized) {
                self.store.refresh().await?;
            }

            if retries >= self.policy.retry_limit {
                return Err(Error::UpstreamUnavailable(failure.to_string()));
            }

            tokio::time::sleep(delay).await;
            retries += 1;
            delay = self.policy.next_delay(delay);
        }
    }

    /// One attempt: attach headers and credential, POST, classify the result.
    async fn attempt(
        &self,
        url: &str,
        endpoint: &str,
        query: &str,
    ) -> std::result::Result<Bytes, AttemptFailure> {
        // A broken store read means "no credential": the request goes out
        // unauthenticated and the resulting 401 drives a refresh.
        let credential = match self.store.get().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "credential store read failed, sending unauthenticated");
                None
            }
        };

        let mut request = self
            .client
            .post(url)
            .header("Client-ID", self.store.client_id())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .timeout(self.timeout)
            .body(query.to_owned());

        if let Some(credential) = credential {
            request = request.header(reqwest::header::AUTHORIZATION, credential.authorization);
        }

        let started = Instant::now();
        let result = request.send().await;
        metrics::histogram!(
            "igdb_request_duration_seconds",
            "endpoint" => endpoint.to_string()
        )
        .record(started.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure::Timeout
            } else {
                AttemptFailure::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(AttemptFailure::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Status(status.as_u16(), snippet(&body)));
        }

        response
            .bytes()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))
    }
}

/// Bound upstream error bodies so log lines and error payloads stay small.
fn snippet(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        body.to_owned()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}
