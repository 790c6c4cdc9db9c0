//! Seat availability endpoints. These are public reads; no caller header.

use crate::seats::{Seat, SeatAvailability};
use crate::server::AppState;
use crate::types::{SeatCode, ShowingId};
use axum::{
    Json,
    extract::{Path, State},
};
use boxoffice_web::WebResult;

/// Seat counts per state for one showing.
///
/// # Errors
///
/// 404 for an unknown showing.
pub async fn availability(
    State(state): State<AppState>,
    Path(showing_id): Path<ShowingId>,
) -> WebResult<Json<SeatAvailability>> {
    Ok(Json(state.app.seats().availability(showing_id)?))
}

/// One seat's state.
///
/// # Errors
///
/// 400 for a malformed seat code, 404 for an unknown seat.
pub async fn seat(
    State(state): State<AppState>,
    Path((showing_id, code)): Path<(ShowingId, String)>,
) -> WebResult<Json<Seat>> {
    let code = SeatCode::parse(&code)?;
    Ok(Json(state.app.seats().seat(showing_id, &code).await?))
}
