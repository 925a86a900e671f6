use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::warn;

use super::IntegrationError;

/// Attempt ceiling and waits shared by every outbound client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Wait after a 429 that carried no usable `Retry-After`.
    pub default_retry_after: Duration,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after: Duration::from_secs(60),
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1 << attempt.saturating_sub(1).min(16))
    }
}

/// Classification of one failed attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("rate limited by remote service")]
    RateLimited { retry_after: Option<Duration> },
    #[error(transparent)]
    Transient(IntegrationError),
    #[error(transparent)]
    Fatal(IntegrationError),
}

/// Runs `attempt` until it succeeds, fails fatally or the policy's attempt
/// ceiling is reached. The closure receives the 1-based attempt number.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    integration: &'static str,
    mut attempt: F,
) -> Result<T, IntegrationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut current = 1;

    loop {
        let err = match attempt(current).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(err) => err,
        };

        if current >= max_attempts {
            warn!(integration, attempts = current, error = %err, "retries exhausted");
            return Err(IntegrationError::RetriesExhausted {
                integration,
                attempts: current,
                last: err.to_string(),
            });
        }

        let wait = match &err {
            AttemptError::RateLimited { retry_after } => {
                retry_after.unwrap_or(policy.default_retry_after)
            }
            _ => policy.backoff_for(current),
        };
        warn!(
            integration,
            attempt = current,
            error = %err,
            wait_ms = wait.as_millis() as u64,
            "attempt failed; retrying"
        );
        sleep(wait).await;
        current += 1;
    }
}

/// Sends the request and classifies the status: 429 is rate limited, 5xx and
/// network errors are transient, any other failure is fatal.
pub(crate) async fn execute(
    integration: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, AttemptError> {
    let response = request.send().await.map_err(|err| {
        AttemptError::Transient(IntegrationError::Network {
            integration,
            message: err.to_string(),
        })
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::RateLimited {
            retry_after: retry_after(response.headers()),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let error = IntegrationError::Http {
        integration,
        status: status.as_u16(),
        body,
    };
    if status.is_server_error() {
        Err(AttemptError::Transient(error))
    } else {
        Err(AttemptError::Fatal(error))
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    integration: &'static str,
    response: reqwest::Response,
) -> Result<T, AttemptError> {
    response.json::<T>().await.map_err(|err| {
        AttemptError::Fatal(IntegrationError::Decode {
            integration,
            message: err.to_string(),
        })
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after(headers.get(RETRY_AFTER)?.to_str().ok()?)
}

/// Only the delta-seconds form is honoured.
pub(crate) fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Keeps successive requests at least `min_interval` apart. The lock is held
/// across the sleep, so concurrent callers queue up behind each other.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(60) / max_requests.max(1))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
