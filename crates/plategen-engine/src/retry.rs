//! Generic retry wrapper for rate-limited external calls.
//!
//! This is a pure resilience primitive: it knows nothing about credits or
//! jobs. Each call site supplies a hint extractor that can surface a
//! provider-mandated wait (a rate-limit retry-after value) from a failure;
//! when present, the hint overrides the computed backoff for that attempt.

use std::future::Future;
use std::time::Duration;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the second attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on the computed backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry policy: attempt count and exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles each attempt.
    pub base_delay: Duration,

    /// Upper bound on the computed delay. Provider hints are not capped.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Compute the backoff delay after failed attempt `attempt` (0-indexed):
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Invoke `operation` until it succeeds or `policy.max_attempts` attempts
/// are exhausted, surfacing the last observed failure.
///
/// There is no delay before the first attempt. After failed attempt *k* the
/// wait is `hint(&err)` when the extractor surfaces one, otherwise the
/// policy's exponential backoff for *k*. The waits are suspension points and
/// hold no locks.
///
/// # Errors
///
/// Returns the error from the final attempt once all attempts are exhausted.
pub async fn call_with_retry<T, E, F, Fut, H>(
    policy: &RetryPolicy,
    hint: H,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: Fn(&E) -> Option<Duration>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= attempts {
                    return Err(err);
                }

                let delay = hint(&err).unwrap_or_else(|| policy.delay_for(attempt));

                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "External call failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
