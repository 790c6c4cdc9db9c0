//! Router configuration for the booking service.

use super::state::AppState;
use crate::api::{bookings, showings, wallets};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use boxoffice_web::AppError;
use boxoffice_web::handlers::health_check;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Routes:
/// - `POST /api/bookings` book and pay in one step
/// - `GET /api/bookings` the caller's bookings
/// - `POST /api/bookings/hold` hold seats, pay later
/// - `GET /api/bookings/:id`
/// - `POST /api/bookings/:id/pay`
/// - `POST /api/bookings/:id/cancel`
/// - `GET /api/showings/:id/availability`
/// - `GET /api/showings/:id/seats/:code`
/// - `GET /api/wallets/:id`
/// - `GET /api/wallets/:id/entries`
/// - `GET /health`, `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/bookings/hold", post(bookings::hold_seats))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/pay", post(bookings::pay_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/showings/:id/availability", get(showings::availability))
        .route("/showings/:id/seats/:code", get(showings::seat))
        .route("/wallets/:id", get(wallets::get_wallet))
        .route("/wallets/:id/entries", get(wallets::list_entries));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.as_deref().and_then(|exporter| exporter.render()) {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => AppError::unavailable("metrics recorder not installed").into_response(),
    }
}
