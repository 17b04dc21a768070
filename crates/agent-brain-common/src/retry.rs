//! Shared retry policy for transient failures
//!
//! Storage and provider calls retry with exponential backoff: 200ms base,
//! 5s cap, 5 attempts. After exhaustion the last error is surfaced to the
//! caller unchanged.

use std::future::Future;
use std::time::Duration;

/// Exponential-backoff retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Ceiling applied to the computed delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2_u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }
}

/// Run `op` under the given retry policy
///
/// `is_transient` decides whether an error is worth retrying; permanent
/// errors are returned immediately.
///
/// # Errors
/// Returns the last error once attempts are exhausted, or the first
/// non-transient error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    mut is_transient: impl FnMut(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < policy.max_attempts && is_transient(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!("Attempt {} failed, retrying in {delay:?}: {e}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        // Capped at 5s regardless of how many attempts
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result: Result<u32, std::io::Error> = retry_with_backoff(
            policy,
            |_| true,
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(std::io::Error::other("transient"))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let policy = RetryPolicy::default();

        let result: Result<(), std::io::Error> = retry_with_backoff(
            policy,
            |_| false,
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(std::io::Error::other("permanent"))
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
