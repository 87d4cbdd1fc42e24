//! Retry with backoff for reasoning calls.

use std::future::Future;
use std::time::Duration;

use dbagent_types::{AgentError, Result};

/// Delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    Fixed(Duration),
    /// base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    None,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
                let millis = u64::try_from(base.as_millis())
                    .unwrap_or(u64::MAX)
                    .saturating_mul(2u64.saturating_pow(exp));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

/// Call `f` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries have been spent. A rate-limit hint from the provider
/// stretches the delay but never shortens it.
pub async fn with_retry<T, F, Fut>(
    mut f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    label: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let mut delay = policy.delay_for_attempt(attempt);
                if let AgentError::RateLimited { retry_after_ms, .. } = &e {
                    delay = delay.max(Duration::from_millis(*retry_after_ms));
                }
                tracing::warn!(
                    call = %label,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
