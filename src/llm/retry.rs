use crate::{AgentError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff for rate-limited API calls.
///
/// The wait before retry `n` (1-based) is `multiplier * 2^(n-1)`, clamped
/// to `[min_wait, max_wait]`. Only errors for which
/// [`AgentError::is_retryable`] holds are retried.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            multiplier: Duration::from_secs(2),
            min_wait: Duration::from_secs(10),
            max_wait: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait before the attempt following failed attempt `attempt`
    pub fn wait_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.multiplier
            .saturating_mul(factor)
            .max(self.min_wait)
            .min(self.max_wait)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.max_attempts {
                        warn!("Giving up after {} attempts: {}", attempt, e);
                        return Err(AgentError::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let wait = self.wait_after(attempt);
                    info!(
                        "Attempt {} failed ({}), retrying in {:.0}s",
                        attempt,
                        e,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
