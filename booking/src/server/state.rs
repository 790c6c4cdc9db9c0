//! Application state for the booking HTTP server.

use crate::app::BoxofficeApp;
use boxoffice_runtime::MetricsExporter;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply, via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// The booking application
    pub app: Arc<BoxofficeApp>,
    /// Prometheus exporter, when the server installed one
    pub metrics: Option<Arc<MetricsExporter>>,
}

impl AppState {
    /// State without a metrics endpoint (tests, embedding).
    #[must_use]
    pub const fn new(app: Arc<BoxofficeApp>) -> Self {
        Self { app, metrics: None }
    }

    /// Attach an installed exporter so `/metrics` can render it.
    #[must_use]
    pub fn with_metrics(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.metrics = Some(exporter);
        self
    }
}
