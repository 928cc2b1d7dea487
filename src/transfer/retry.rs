//! Conflict retry policy
//!
//! Exponential backoff with full jitter: attempt `n` sleeps a uniformly
//! random duration in `[0, min(base * 2^(n-1), max)]`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::error::TransferError;
use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Single attempt, conflicts surface immediately
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Upper bound of the sleep after failed attempt `attempt` (1-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let max_nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::thread_rng().gen_range(0..=max_nanos))
    }

    /// Run `op` until it returns something other than a conflict, sleeping
    /// `backoff(attempt)` between attempts
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "Conflict, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(TransferError::Conflict { attempts: attempt });
                }
                other => return other,
            }
        }
    }
}
