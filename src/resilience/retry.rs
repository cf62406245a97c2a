//! # Retry Executor
//!
//! Re-runs an async operation after transient failures, classified by the
//! error's code against a policy's retryable set. Meant for store connection
//! and read/write calls, not business logic.

use crate::clock::duration_to_ms;
use crate::resilience::backoff::calculate_backoff;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Codes retried by default: socket-level faults plus transient server states
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNREFUSED",
    "EPIPE",
    "LOADING",
    "BUSY",
    "TRYAGAIN",
    "MASTERDOWN",
    "CLUSTERDOWN",
];

/// Errors that expose a machine-readable code for retry classification
pub trait ErrorCode {
    fn error_code(&self) -> Option<&str>;
}

impl ErrorCode for std::io::Error {
    fn error_code(&self) -> Option<&str> {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::ConnectionReset => Some("ECONNRESET"),
            ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            ErrorKind::TimedOut => Some("ETIMEDOUT"),
            ErrorKind::BrokenPipe => Some("EPIPE"),
            _ => None,
        }
    }
}

/// Retry configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub retryable_error_codes: HashSet<String>,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retryable_error_codes: DEFAULT_RETRYABLE_CODES
                .iter()
                .map(|code| code.to_string())
                .collect(),
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(2_000),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable<E: ErrorCode>(&self, error: &E) -> bool {
        error
            .error_code()
            .is_some_and(|code| self.retryable_error_codes.contains(code))
    }

    /// Sleep applied after the failed attempt with 0-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX),
            u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX),
        )
    }
}

/// Run `operation` under `policy`
///
/// Non-retryable errors and the error of the final attempt are returned
/// unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorCode + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    return Err(error);
                }
                if attempt + 1 >= max_attempts {
                    warn!(
                        attempts = attempt + 1,
                        code = error.error_code().unwrap_or_default(),
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    attempt = attempt,
                    code = error.error_code().unwrap_or_default(),
                    delay_ms = duration_to_ms(delay),
                    error = %error,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::connection("ECONNRESET", "reset by peer"))
            } else {
                Ok("value")
            }
        })
        .await;

        assert_eq!(result, Ok("value"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::backend(Some("WRONGTYPE"), "wrong kind of value"))
        })
        .await;

        assert_eq!(
            result,
            Err(StoreError::backend(Some("WRONGTYPE"), "wrong kind of value"))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_error_surfaces_after_exhaustion() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(3), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::backend(Some("BUSY"), format!("attempt {n}")))
        })
        .await;

        assert_eq!(result, Err(StoreError::backend(Some("BUSY"), "attempt 2")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(2_000));
        for code in DEFAULT_RETRYABLE_CODES {
            assert!(policy.retryable_error_codes.contains(*code));
        }
    }

    #[test]
    fn test_io_error_codes() {
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert_eq!(reset.error_code(), Some("ECONNRESET"));
        let other = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(other.error_code(), None);
    }
}
