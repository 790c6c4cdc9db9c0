//! Prometheus metrics for observability and monitoring.
//!
//! This module owns the process-wide recorder and the runtime-level metrics:
//! - Entity lock acquisition latency and timeouts
//! - Retry attempts, late successes and exhaustion
//!
//! Business metrics (bookings, wallets, discounts) are described and recorded by
//! the application crate on top of the same recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use boxoffice_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Serve `exporter.render()` from a `/metrics` endpoint.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder installed once per process.
///
/// Rendering is left to the caller so the text format can be served from the
/// application's own HTTP router.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not installed its recorder yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register descriptions and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. several tests in one process),
    /// this logs a warning and leaves the exporter without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all runtime metric descriptions.
fn register_metrics() {
    // Entity lock metrics
    describe_histogram!(
        "entity_lock_wait_duration_seconds",
        "Time spent waiting for a per-entity lock"
    );
    describe_counter!(
        "entity_lock_timeouts_total",
        "Total number of lock acquisitions that exceeded the wait budget"
    );

    // Retry metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Total number of operations that succeeded after retrying"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Entity lock metrics recorder.
pub struct LockMetrics;

impl LockMetrics {
    /// Record a granted lock and how long the caller waited.
    pub fn record_acquired(table: &'static str, waited: Duration) {
        histogram!("entity_lock_wait_duration_seconds", "table" => table)
            .record(waited.as_secs_f64());
    }

    /// Record a lock wait that hit its budget.
    pub fn record_timeout(table: &'static str) {
        counter!("entity_lock_timeouts_total", "table" => table).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt(operation: &'static str) {
        counter!("retry_attempts_total", "operation" => operation).increment(1);
    }

    /// Record a success after at least one retry.
    pub fn record_success(operation: &'static str) {
        counter!("retry_successes_total", "operation" => operation).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(operation: &'static str) {
        counter!("retry_exhausted_total", "operation" => operation).increment(1);
    }
}
