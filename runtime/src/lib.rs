//! # Boxoffice Runtime
//!
//! Runtime support shared by the booking core's ledgers:
//!
//! - [`locks`]: per-entity async mutexes whose waits are always bounded
//! - [`retry`]: exponential backoff for compensations and optimistic loops
//! - [`metrics`]: Prometheus recorder plus lock/retry instrumentation
//!
//! Nothing here knows about seats or wallets; the application crate composes
//! these pieces into its ledgers.

#![forbid(unsafe_code)]

pub mod locks;
pub mod metrics;
pub mod retry;

pub use locks::{EntityTable, LockError, lock_within};
pub use metrics::MetricsExporter;
pub use retry::{RetryExhausted, RetryPolicy, retry_with_backoff, retry_with_predicate};
