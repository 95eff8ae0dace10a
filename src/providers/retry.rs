//! Jittered exponential backoff for transient HTTP failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tracing::warn;

use crate::config::RecoveryConfig;
use crate::errors::{BotError, BotResult};

/// A failed request attempt and whether repeating it may help
#[derive(Debug)]
pub struct HttpFailure {
    pub error: BotError,
    pub transient: bool,
}

impl HttpFailure {
    pub fn permanent(error: BotError) -> Self {
        Self {
            error,
            transient: false,
        }
    }

    pub fn transient(error: BotError) -> Self {
        Self {
            error,
            transient: true,
        }
    }

    /// Classify an HTTP status that was not a success
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let error = BotError::Provider(format!("HTTP {status}: {}", body.trim()));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::transient(error)
        } else {
            Self::permanent(error)
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request();
        Self {
            error: BotError::from(err),
            transient,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RecoveryConfig> for RetryPolicy {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with up to 50% jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = exponential.as_millis() as u64 / 2;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        exponential + Duration::from_millis(jitter)
    }

    /// Run `request` until it succeeds, fails permanently, or retries run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut request: F) -> BotResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HttpFailure>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.transient && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation = %operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        for attempt in 0..8 {
            assert!(policy.backoff_delay(attempt) <= Duration::from_millis(600));
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = &AtomicU32::new(0);
        let result = fast_policy(3)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HttpFailure::transient(BotError::Provider("503".into())))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let calls = &AtomicU32::new(0);
        let result: BotResult<()> = fast_policy(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpFailure::permanent(BotError::Provider("400".into())))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_classification() {
        assert!(HttpFailure::from_status(StatusCode::BAD_GATEWAY, "").transient);
        assert!(HttpFailure::from_status(StatusCode::TOO_MANY_REQUESTS, "").transient);
        assert!(!HttpFailure::from_status(StatusCode::UNAUTHORIZED, "").transient);
    }
}
