//! # Boxoffice Testing
//!
//! Testing utilities and helpers for the Boxoffice booking core.
//!
//! This crate provides:
//! - Clocks that tests control (`FixedClock`, `ManualClock`)
//! - Helpers to build deterministic timestamps
//! - A barrier-synchronised race helper for concurrency tests
//! - One-shot tracing initialisation for test output
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::environment::Clock;
//! use boxoffice_testing::{ManualClock, utc};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(utc(2025, 1, 6, 10, 0));
//! let start = clock.now();
//! clock.advance(Duration::minutes(11));
//! assert_eq!(clock.now() - start, Duration::minutes(11));
//! ```

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Mutex, PoisonError};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Mutex, PoisonError, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test moves it.
    ///
    /// Share it behind an `Arc` between the system under test and the test body
    /// to expire seat locks and stale bookings without sleeping.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward (or backward, for negative durations).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (Monday 2025-01-06 10:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(super::utc(2025, 1, 6, 10, 0))
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::future::Future;
    use std::sync::{Arc, Once};
    use tokio::sync::Barrier;

    static TRACING: Once = Once::new();

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Honours `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "warn".into()),
                )
                .with_test_writer()
                .try_init();
        });
    }

    /// Run `n` copies of `task` concurrently, releasing them together.
    ///
    /// Each task receives its index. All tasks wait on a shared barrier before
    /// starting, which maximises overlap on a multi-threaded runtime. Results
    /// come back in index order; a panicking task yields `None`.
    pub async fn race<F, Fut, T>(n: usize, task: F) -> Vec<Option<T>>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                let fut = task(i);
                tokio::spawn(async move {
                    barrier.wait().await;
                    fut.await
                })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(Result::ok)
            .collect()
    }
}

/// Build a UTC timestamp; out-of-range components fall back to the Unix epoch.
#[must_use]
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

// Re-export commonly used items
pub use helpers::{init_test_tracing, race};
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), utc(2025, 1, 6, 10, 0));
    }

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(utc(2025, 1, 6, 10, 0));
        assert_eq!(clock.now(), utc(2025, 1, 6, 10, 0));
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now(), utc(2025, 1, 6, 10, 30));
        clock.set(utc(2025, 2, 1, 0, 0));
        assert_eq!(clock.now(), utc(2025, 2, 1, 0, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_race_returns_results_in_order() {
        let results = race(8, |i| async move { i * 2 }).await;
        let values: Vec<usize> = results.into_iter().flatten().collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }
}
