//! Bounded exponential backoff for transient fetch failures.

use super::FetchError;
use std::future::Future;
use std::time::Duration;

/// Cap on the backoff exponent so the shift below cannot overflow.
const MAX_EXPONENT: u32 = 6;

/// Ceiling on any single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry schedule: `base_delay * 2^attempt`, capped at [`MAX_DELAY`],
/// for at most `max_attempts` total attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempt ceiling, first attempt included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    /// Delay to sleep after a failed attempt (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// Drive `op` under `policy`: transient failures are retried with backoff
/// until the attempt ceiling, everything else surfaces immediately.
pub(super) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
