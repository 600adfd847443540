//! Retry with exponential backoff for transient failures.
//!
//! Errors opt in through [`Transient`]; anything not transient is returned
//! on the first failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classification hook for retry decisions.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for crate::render::RenderError {
    fn is_transient(&self) -> bool {
        crate::render::RenderError::is_transient(self)
    }
}

impl Transient for crate::store::StoreError {
    fn is_transient(&self) -> bool {
        crate::store::StoreError::is_transient(self)
    }
}

/// Backoff schedule: `base * 2^(attempt-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
            max_backoff,
        }
    }

    /// No sleeping between attempts; used by tests and one-shot callers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Execute an async operation, retrying transient failures.
///
/// # Example
/// ```ignore
/// let rows = execute_with_retry(
///     || store.insert_batch("upcoming_matches", &chunk),
///     RetryPolicy::default(),
///     "insert chunk",
/// ).await?;
/// ```
pub async fn execute_with_retry<F, Fut, T, E>(mut f: F, policy: RetryPolicy, operation: &str) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    operation,
                    attempt,
                    max_attempts,
                    e,
                    backoff.as_millis()
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}
