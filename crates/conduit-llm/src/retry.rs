//! Bounded exponential backoff for upstream calls

use std::future::Future;
use std::time::Duration;

use conduit_config::RetryConfig;

use crate::error::ProviderError;

/// Backoff schedule applied to retryable [`ProviderError`]s
///
/// The policy holds no mutable state and can be shared by every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on any single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    /// Wait before retry number `attempt` (1-based) after `error`
    ///
    /// A `Retry-After` hint from the upstream raises the wait but never past
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self.base_delay.saturating_mul(1_u32 << exponent);
        let wait = error.retry_after().map_or(backoff, |hint| backoff.max(hint));

        wait.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out
    ///
    /// # Errors
    ///
    /// Returns the last error unchanged
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt, &error);

                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying upstream call"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Run `op` with exponential backoff starting at `base_delay`
///
/// # Errors
///
/// Returns the last error once `op` fails terminally or `max_attempts` is spent
pub async fn with_retry<T, F, Fut>(op: F, max_attempts: u32, base_delay: Duration) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    RetryPolicy::new(max_attempts, base_delay).run(op).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::error::ErrorKind;

    fn counting_op(
        calls: &Arc<AtomicU32>,
        failures: u32,
        error: ProviderError,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str, ProviderError>> {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures { Err(error.clone()) } else { Ok("done") })
        }
    }

    #[tokio::test]
    async fn succeeds_after_two_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = with_retry(
            counting_op(&calls, 2, ProviderError::transient("reset")),
            3,
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = with_retry(
            counting_op(&calls, 5, ProviderError::auth("bad key")),
            3,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_unchanged() {
        let calls = Arc::new(AtomicU32::new(0));
        let error = ProviderError::rate_limited("slow down", None).with_status(429);

        let err = with_retry(counting_op(&calls, 10, error), 2, Duration::from_millis(1))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.message(), "slow down");
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let _ = with_retry(counting_op(&calls, 0, ProviderError::unknown("?")), 0, Duration::ZERO).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_double_and_respect_cap_and_hint() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let transient = ProviderError::transient("x");

        assert_eq!(policy.delay_for(1, &transient), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, &transient), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, &transient), Duration::from_millis(350));

        let hinted = ProviderError::rate_limited("x", Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_for(1, &hinted), Duration::from_millis(300));
    }
}
