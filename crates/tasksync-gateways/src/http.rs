//! Shared HTTP plumbing for the service gateways.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tasksync_core::{GatewayError, Side};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::optional_env;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// 5xx and 429 are worth replaying; every other failure status is final.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Whether a request may be replayed without risking a duplicate write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

impl Idempotency {
    /// Replays allowed for a request of this kind under `backoff`.
    pub fn retry_budget(self, backoff: &BackoffPolicy) -> usize {
        match self {
            Idempotency::Idempotent => backoff.max_retries,
            Idempotency::NonIdempotent => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before replay number `retry` (zero-based): doubles each time, never above `max_delay`.
    pub fn delay_before_retry(&self, retry: usize) -> Duration {
        u32::try_from(retry)
            .ok()
            .and_then(|r| 2u32.checked_pow(r))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

impl TokenBucketConfig {
    pub fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            capacity: requests,
            refill_every: Duration::from_secs(60) / requests,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: Some(format!("tasksync/{}", env!("CARGO_PKG_VERSION"))),
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: optional_env("TASKSYNC_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: optional_env("TASKSYNC_USER_AGENT").or(defaults.user_agent),
            backoff: BackoffPolicy {
                max_retries: optional_env("TASKSYNC_HTTP_MAX_RETRIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.backoff.max_retries),
                ..defaults.backoff
            },
            token_bucket: None,
        }
    }

    pub fn with_token_bucket(mut self, token_bucket: Option<TokenBucketConfig>) -> Self {
        self.token_bucket = token_bucket;
        self
    }
}

/// Spaces requests `interval` apart while allowing bursts of `burst`.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    burst: u32,
    next_slot: Mutex<Instant>,
}

impl RequestPacer {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            interval: config.refill_every,
            burst: config.capacity.max(1),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Books the next slot and returns how long the caller must wait for it.
    fn reserve(&self, next_slot: &mut Instant, now: Instant) -> Duration {
        let slot = (*next_slot).max(now);
        let burst_window = self.interval * (self.burst - 1);
        *next_slot = slot + self.interval;
        slot.checked_sub(burst_window).map_or(Duration::ZERO, |eligible| {
            eligible.saturating_duration_since(now)
        })
    }

    pub async fn acquire(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock().await;
            self.reserve(&mut next_slot, Instant::now())
        };
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "pacing request");
            tokio::time::sleep(wait).await;
        }
    }
}

/// reqwest client bound to one side, with bounded retries for idempotent calls.
#[derive(Debug)]
pub struct ApiClient {
    side: Side,
    client: reqwest::Client,
    backoff: BackoffPolicy,
    pacer: Option<Arc<RequestPacer>>,
}

impl ApiClient {
    pub fn new(side: Side, config: &HttpClientConfig) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder().gzip(true).timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("building {side} http client: {e}")))?;
        let pacer = config.token_bucket.map(|c| Arc::new(RequestPacer::new(c)));

        Ok(Self {
            side,
            client,
            backoff: config.backoff,
            pacer,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Sends `request`, returning the body of a 2xx response.
    ///
    /// Only idempotent requests are replayed; creates go out exactly once.
    pub async fn send(
        &self,
        request: RequestBuilder,
        idempotency: Idempotency,
    ) -> Result<Vec<u8>, GatewayError> {
        let retries = idempotency.retry_budget(&self.backoff);

        let mut attempt = 0usize;
        loop {
            if let Some(pacer) = &self.pacer {
                pacer.acquire().await;
            }

            let builder = request.try_clone().ok_or_else(|| GatewayError::Transport {
                side: self.side,
                message: "request body cannot be replayed".to_string(),
            })?;

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.bytes().await.map_err(|e| self.transport(e))?;
                        return Ok(body.to_vec());
                    }

                    if attempt < retries && is_retryable_status(status) {
                        warn!(side = %self.side, status = status.as_u16(), attempt, "retrying after http status");
                        tokio::time::sleep(self.backoff.delay_before_retry(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(GatewayError::Status {
                        side: self.side,
                        status: status.as_u16(),
                        body: truncate_body(body),
                    });
                }
                Err(err) => {
                    if attempt < retries && is_retryable_error(&err) {
                        warn!(side = %self.side, attempt, "retrying after transport error");
                        tokio::time::sleep(self.backoff.delay_before_retry(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(self.transport(err));
                }
            }
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        idempotency: Idempotency,
    ) -> Result<T, GatewayError> {
        let body = self.send(request, idempotency).await?;
        debug!(side = %self.side, bytes = body.len(), "decoding response");
        serde_json::from_slice(&body).map_err(|e| GatewayError::Malformed {
            side: self.side,
            message: e.to_string(),
        })
    }

    fn transport(&self, err: reqwest::Error) -> GatewayError {
        // Query strings carry credentials on the board side.
        GatewayError::Transport {
            side: self.side,
            message: err.without_url().to_string(),
        }
    }
}

fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body
    } else {
        let mut cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_get_no_replays() {
        let policy = BackoffPolicy::default();
        assert_eq!(Idempotency::Idempotent.retry_budget(&policy), 2);
        assert_eq!(Idempotency::NonIdempotent.retry_budget(&policy), 0);
        assert_eq!(Idempotency::Idempotent.retry_budget(&BackoffPolicy::none()), 0);
    }

    #[test]
    fn default_backoff_doubles_up_to_five_seconds() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..6).map(|r| policy.delay_before_retry(r)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(policy.delay_before_retry(usize::MAX), Duration::from_secs(5));
    }

    #[test]
    fn only_overload_and_server_statuses_replay() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::CONFLICT));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn per_minute_limit_spaces_slots() {
        let bucket = TokenBucketConfig::per_minute(12);
        assert_eq!(bucket.capacity, 12);
        assert_eq!(bucket.refill_every, Duration::from_secs(5));
    }

    #[test]
    fn pacer_allows_a_burst_then_waits_one_interval_per_request() {
        let pacer = RequestPacer::new(TokenBucketConfig {
            capacity: 2,
            refill_every: Duration::from_secs(1),
        });
        let now = Instant::now();
        let mut next_slot = now;

        assert_eq!(pacer.reserve(&mut next_slot, now), Duration::ZERO);
        assert_eq!(pacer.reserve(&mut next_slot, now), Duration::ZERO);
        assert_eq!(pacer.reserve(&mut next_slot, now), Duration::from_secs(1));
        assert_eq!(pacer.reserve(&mut next_slot, now), Duration::from_secs(2));

        let later = now + Duration::from_secs(10);
        assert_eq!(pacer.reserve(&mut next_slot, later), Duration::ZERO);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let cut = truncate_body(body);
        assert_eq!(cut.len(), MAX_ERROR_BODY_CHARS + 3);
        assert!(cut.ends_with("..."));
    }
}
