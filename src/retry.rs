use std::future::Future;
use std::time::Duration;

use rand::Rng as _;
use serde::Deserialize;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Transient failure: consume an attempt, back off, try again.
    Retry,
    /// Server asked us to slow down: wait the cooldown without consuming
    /// an attempt.
    RateLimited,
    Abort,
}

/// Exponential backoff configuration with jitter to prevent thundering herd
/// when many concurrent requests hit the same transient failure.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_cooldown_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            rate_limit_cooldown_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Compute the delay for a given retry (0-indexed).
    ///
    /// Formula: `min(base_delay * 2^retry, max_delay) + random_jitter(0..base_delay)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp_delay = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_ms);
        let jitter = if self.base_delay_ms > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}

/// Retry an async operation with exponential backoff and jitter.
///
/// - `config`: retry configuration
/// - `classifier`: inspects an error and returns `Retry`, `RateLimited` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error once the attempts are
/// used up or the classifier returns `Abort`. Rate-limited attempts are not
/// counted.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        match classifier(&err) {
            RetryAction::Abort => return Err(err),
            RetryAction::RateLimited => {
                let cooldown = config.rate_limit_cooldown();
                tracing::warn!(
                    "Rate limited, waiting {}ms before retrying: {}",
                    cooldown.as_millis(),
                    err
                );
                tokio::time::sleep(cooldown).await;
            }
            RetryAction::Retry => {
                attempt += 1;
                if attempt >= total_attempts {
                    return Err(err);
                }
                let delay = config.delay_for_retry(attempt - 1);
                tracing::warn!(
                    "Retryable error (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    total_attempts,
                    delay.as_millis(),
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
