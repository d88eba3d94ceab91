//! Bounded retry with exponential backoff and full jitter

use crate::error::{CloudError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff ceiling after the given (1-based) failed attempt:
    /// `initial_delay << (attempt - 1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Timeouts and transient network errors are worth retrying; nothing else is.
pub fn is_retryable_default(err: &CloudError) -> bool {
    matches!(err, CloudError::Timeout(_) | CloudError::Network(_))
}

/// Uniformly random delay in `[0, ceiling]`
fn full_jitter(ceiling: Duration) -> Duration {
    let max_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget runs out. The last error is returned in both failure cases.
///
/// A cancelled token aborts with [`CloudError::Cancelled`], both before an
/// attempt and during a backoff sleep.
pub async fn retry_with_backoff<T, F, Fut, P>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&CloudError) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let delay = full_jitter(config.delay_for_attempt(attempt));
        tracing::debug!(
            "Attempt {}/{} failed ({}), retrying in {:?}",
            attempt,
            max_attempts,
            err,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CloudError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10)); // capped at max
        assert_eq!(config.delay_for_attempt(64), Duration::from_secs(10));
    }

    #[test]
    fn test_default_predicate() {
        assert!(is_retryable_default(&CloudError::Timeout("t".into())));
        assert!(is_retryable_default(&CloudError::Network("reset".into())));
        assert!(!is_retryable_default(&CloudError::Cancelled));
        assert!(!is_retryable_default(&CloudError::RateLimited("429".into())));
        assert!(!is_retryable_default(&CloudError::NotFound("x".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = retry_with_backoff(&fast_config(5), &cancel, is_retryable_default, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(CloudError::Network("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<()> =
            retry_with_backoff(&fast_config(3), &cancel, is_retryable_default, || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(CloudError::Timeout(format!("attempt {}", n)))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CloudError::Timeout(msg)) => assert_eq!(msg, "attempt 3"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<()> =
            retry_with_backoff(&fast_config(5), &cancel, is_retryable_default, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CloudError::RateLimited("slow down".into()))
                }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> =
            retry_with_backoff(&fast_config(5), &cancel, is_retryable_default, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        };

        let trigger = cancel.clone();
        let result: Result<()> = retry_with_backoff(&config, &cancel, |_| true, || {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                Err(CloudError::Network("down".into()))
            }
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
