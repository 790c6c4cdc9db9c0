//! Retry logic with exponential backoff.
//!
//! Two callers in the booking core need retries:
//!
//! - compensating credits after a post-debit failure, which must keep trying
//!   because they protect member funds, and
//! - short optimistic loops that re-read shared state after a lost race.
//!
//! Both go through [`retry_with_predicate`]; the predicate decides which errors
//! are worth another attempt.
//!
//! # Example
//!
//! ```rust
//! use boxoffice_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(10))
//!     .max_delay(Duration::from_secs(1))
//!     .build();
//!
//! let value = retry_with_backoff(&policy, "example", || async {
//!     Ok::<_, String>(42)
//! })
//! .await
//! .map_err(|e| e.last_error)?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::metrics::RetryMetrics;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 50ms
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2.0
/// - `jitter`: enabled
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Policy that never waits and never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Calculate the delay before retry number `attempt` (0-indexed).
    ///
    /// `delay = min(initial_delay * multiplier^attempt, max_delay)`, then
    /// scaled into `[0.5, 1.0]` of itself when jitter is on.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            capped_secs * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs.max(0.0))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.policy.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// The operation kept failing; carries the last error seen.
#[derive(Debug, Error)]
#[error("{operation} gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryExhausted<E: fmt::Display + fmt::Debug> {
    /// Label of the retried operation
    pub operation: &'static str,
    /// Total number of calls made
    pub attempts: u32,
    /// Error returned by the final call
    pub last_error: E,
    /// `false` when the predicate rejected the error before the budget ran out
    pub retryable: bool,
}

/// Retry an async operation, retrying every error.
///
/// # Errors
///
/// Returns [`RetryExhausted`] with the last error once `max_retries` retries
/// have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + fmt::Debug,
{
    retry_with_predicate(policy, operation, op, |_| true).await
}

/// Retry an async operation while `is_retryable` accepts the error.
///
/// # Errors
///
/// Returns [`RetryExhausted`] when the predicate rejects an error
/// (`retryable == false`) or the retry budget is spent.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
    is_retryable: P,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + fmt::Debug,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    RetryMetrics::record_success(operation);
                    tracing::info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(operation, error = %err, "Error is not retryable");
                    return Err(RetryExhausted {
                        operation,
                        attempts: attempt + 1,
                        last_error: err,
                        retryable: false,
                    });
                }

                if attempt >= policy.max_retries {
                    RetryMetrics::record_exhausted(operation);
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(RetryExhausted {
                        operation,
                        attempts: attempt + 1,
                        last_error: err,
                        retryable: true,
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                RetryMetrics::record_attempt(operation);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
