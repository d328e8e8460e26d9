//! Bounded retry with exponential backoff.
//!
//! Used for every call that may suspend on an external dependency: the
//! scoring oracle and the persistence layer. Each attempt carries its own
//! deadline; exhaustion returns the last error to the caller.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::Transient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_ORACLE_ATTEMPTS,
            attempt_timeout: Duration::from_millis(constants::DEFAULT_ORACLE_DEADLINE_MS),
            initial_backoff: Duration::from_millis(constants::DEFAULT_INITIAL_BACKOFF_MS),
            multiplier: 2,
            max_backoff: Duration::from_millis(constants::DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after the given (1-based) failed attempt
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Policy for persistence writes: short deadlines, quick retries
    pub fn for_storage() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(50),
            multiplier: 2,
            max_backoff: Duration::from_millis(500),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.attempt_timeout)),
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{} succeeded on attempt {}/{}", what, attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                let wait = policy.backoff_after(attempt);
                log::warn!("{} failed (attempt {}/{}): {} - retrying in {:?}", what, attempt, attempts, e, wait);
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                log::warn!("{} failed after {} attempt(s): {}", what, attempt, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_after(10), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, OracleError> = retry_with_backoff(&RetryPolicy::default(), "probe", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(OracleError::Unavailable("down".into()))
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
    async fn test_timeouts_exhaust_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), OracleError> = retry_with_backoff(&RetryPolicy::default(), "slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(OracleError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), OracleError> = retry_with_backoff(&RetryPolicy::default(), "bad", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OracleError::InvalidResponse("garbage".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
