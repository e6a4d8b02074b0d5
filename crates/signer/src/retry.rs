//! Retry policy for signer calls that can hit transient platform failures.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::error::{Result, SignError};

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Default factor applied to the delay after every retry.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// How often, how patiently, and on which errors to retry a signer call.
///
/// Cancellation is never retried, whatever the predicate says.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
    retryable: fn(&SignError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_INITIAL_BACKOFF,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }
}

impl RetryPolicy {
    /// Retries only [`SignError::AssociatedDomainRace`].
    pub const fn new(max_attempts: u32, initial_backoff: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            multiplier,
            retryable: SignError::is_associated_domain_race,
        }
    }

    /// A single attempt.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1)
    }

    pub const fn with_predicate(mut self, retryable: fn(&SignError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    pub fn is_retryable(&self, error: &SignError) -> bool {
        !error.is_cancelled() && (self.retryable)(error)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. The last error is returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts && self.is_retryable(&error) => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = max_attempts,
                        error = %error,
                        ?backoff,
                        "signer request failed, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_race_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SignError::AssociatedDomainRace("error 1004".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignError::AssociatedDomainRace("error 1004".into()))
            })
            .await;

        assert!(result.unwrap_err().is_associated_domain_race());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_other_errors() {
        for error in [SignError::Cancelled, SignError::AuthFailed] {
            let calls = AtomicU32::new(0);
            let mut error = Some(error);
            let result: Result<()> = RetryPolicy::default()
                .run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let error = error.take().unwrap_or(SignError::AuthFailed);
                    async move { Err(error) }
                })
                .await;

            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_never_retried() {
        let policy = RetryPolicy::default().with_predicate(|_| true);
        assert!(!policy.is_retryable(&SignError::Cancelled));
        assert!(policy.is_retryable(&SignError::AuthFailed));
    }
}
