//! Exponential backoff for transient provider failures
//!
//! Only [`ProviderError::TransientNetwork`] is retried. Permission, quota
//! and validation failures surface on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::errors::ProviderError;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay; attempt `n` waits `base * 2^n`
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Retry settings applied to provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `f`, retrying transient failures with exponential backoff
    ///
    /// Cancellation during a backoff sleep returns `ProviderError::Aborted`.
    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempt, "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ProviderError::Aborted),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = policy
            .run("flaky", &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::TransientNetwork("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permission_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<(), _> = policy
            .run("denied", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Permission("403".into()))
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Permission(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<(), _> = policy
            .run("down", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::TransientNetwork("503".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let result: Result<(), _> = policy
            .run("slow", &cancel, || async {
                Err(ProviderError::TransientNetwork("timeout".into()))
            })
            .await;
        assert_eq!(result, Err(ProviderError::Aborted));
    }

    #[tokio::test]
    async fn test_unbounded_delay_saturates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(1, Duration::MAX);
        assert_eq!(policy.delay_for(4), Duration::MAX);

        let result: Result<(), _> = policy
            .run("stalled", &cancel, || async {
                Err(ProviderError::TransientNetwork("timeout".into()))
            })
            .await;
        assert_eq!(result, Err(ProviderError::Aborted));
    }
}
