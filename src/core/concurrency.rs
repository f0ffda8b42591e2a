//! Bounded-concurrency task running and retry with exponential backoff.
//!
//! Every batch operation in the engine funnels through
//! [`run_with_concurrency`]: a list of independent async tasks runs with at
//! most `limit` in flight, the next queued task is admitted as soon as any
//! running one settles, and a result is returned for every task regardless
//! of individual failures.

use crate::errors::Result;
use futures::{StreamExt, stream};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `tasks` with at most `limit` in flight at once.
///
/// Results come back in submission order. A failing task never cancels its
/// siblings; the caller inspects each `Result` individually.
pub async fn run_with_concurrency<T, F>(tasks: Vec<F>, limit: usize) -> Vec<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    if tasks.is_empty() {
        return Vec::new();
    }

    stream::iter(tasks).buffered(limit.max(1)).collect().await
}

/// Retry behavior for calls wrapping fragile third-party services.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub tries: u32,
    /// Base delay; attempt N waits `base_delay * 2^(N-1)` before retrying
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-indexed).
    fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Runs `op` until it succeeds or the policy's attempts are exhausted,
/// sleeping with exponential backoff between attempts.
///
/// Each failure is logged with `label`; the last error becomes the final
/// result.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(label, attempt, error = %err, "task attempt failed");
                if attempt >= policy.tries {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_after_attempt(attempt)).await;
            }
        }
    }
}
