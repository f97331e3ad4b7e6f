//! Exponential backoff with jitter for calls to the forecast provider.
//!
//! Every call site passes its own [`BackoffPolicy`]; there is no global
//! default that callers mutate.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use stratus_core::{BackoffPolicy, Error, retry_with_backoff};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = BackoffPolicy::new(3, Duration::from_millis(200), Duration::from_secs(5));
//! let cancel = CancellationToken::new();
//!
//! let value = retry_with_backoff(&policy, "fetch_forecast", &cancel, || async {
//!     Ok::<_, Error>(42)
//! })
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Backoff parameters for one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt.
    pub base_delay: Duration,
    /// Upper bound for the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with explicit settings.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Un-jittered delay after a failed `attempt` (0-based):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(63) as i32);
        let delay = self.base_delay.as_secs_f64() * exp;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Jittered sleep for `attempt`, uniform in `[0.5 * delay, 1.5 * delay)`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let factor = 0.5 + rand::rng().random::<f64>();
        self.delay_for_attempt(attempt).mul_f64(factor)
    }
}

/// Execute an async operation, retrying with exponential backoff and jitter.
///
/// The operation runs at most `max_retries + 1` times. Each attempt and each
/// backoff sleep races the cancellation token: cancelling drops the
/// in-flight attempt and returns [`Error::Cancelled`], even if the attempt
/// would have succeeded.
///
/// Non-retryable errors (see [`Error::is_retryable`]) are returned at once.
/// When every attempt fails, the most recent error is returned.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} cancelled during attempt {}", operation_name, attempt + 1);
                return Err(Error::Cancelled);
            }
            result = operation() => result,
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if cancel.is_cancelled() {
                    debug!("{} cancelled after attempt {}", operation_name, attempt + 1);
                    return Err(Error::Cancelled);
                }

                if attempt < policy.max_retries {
                    let delay = policy.jittered_delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation_name,
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            debug!("{} cancelled during backoff", operation_name);
                            return Err(Error::Cancelled);
                        }
                    }
                }

                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(Error::BackoffExhausted))
}
