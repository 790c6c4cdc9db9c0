//! Boxoffice booking server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs the tracing subscriber and the Prometheus recorder
//! - Builds the booking application, optionally seeding demo data
//! - Starts the maintenance loops (lock sweep, stale bookings, rollover)
//! - Serves the HTTP API until Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! BOXOFFICE_SEED_DEMO=true cargo run --bin boxoffice-server
//! ```

use anyhow::Context;
use boxoffice::metrics::register_business_metrics;
use boxoffice::server::{AppState, build_router};
use boxoffice::{BoxofficeApp, Config};
use boxoffice_core::environment::SystemClock;
use boxoffice_runtime::MetricsExporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Boxoffice booking server...");
    tracing::info!(
        bind = %config.bind_address(),
        seat_hold_ttl = config.booking.seat_hold_ttl,
        pending_timeout = config.booking.pending_timeout,
        max_seats = config.booking.max_seats,
        "Configuration loaded"
    );

    // Metrics
    let mut exporter = MetricsExporter::new();
    exporter.install().context("installing Prometheus recorder")?;
    register_business_metrics();

    // Application
    let app = Arc::new(BoxofficeApp::new(config.clone(), Arc::new(SystemClock)));
    if config.server.seed_demo {
        let seed = app.seed_demo().context("seeding demo data")?;
        tracing::info!(
            showing_id = %seed.showing_id,
            member_id = %seed.member_id,
            wallet_id = %seed.wallet.id,
            discount = %seed.discount_code,
            "Demo data ready"
        );
    }

    // Background maintenance
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = app.spawn_maintenance(shutdown_rx);

    // HTTP
    let state = AppState::new(Arc::clone(&app)).with_metrics(Arc::new(exporter));
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    tracing::info!(address = %config.bind_address(), "Boxoffice server is running");
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutting down gracefully...");
        })
        .await
        .context("serving HTTP")?;

    // Stop maintenance loops and wait for them, bounded by the shutdown timeout.
    let _ = shutdown_tx.send(true);
    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(timeout, futures::future::join_all(maintenance))
        .await
        .is_err()
    {
        tracing::warn!(?timeout, "Maintenance tasks did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
