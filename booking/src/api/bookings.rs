//! Booking endpoints.
//!
//! - POST /api/bookings - book and pay (201)
//! - POST /api/bookings/hold - hold seats, pay later (201)
//! - GET /api/bookings - the caller's bookings
//! - GET /api/bookings/:id - one booking (owner only)
//! - POST /api/bookings/:id/pay - pay a held booking
//! - POST /api/bookings/:id/cancel - cancel, refunding if paid
//!
//! # Booking Flow
//!
//! ```text
//! hold → PENDING/UNPAID ──pay──→ CONFIRMED/PAID ──complete──→ COMPLETED
//!            │                         │
//!       expire/cancel               cancel (refund)
//!            ↓                         ↓
//!       CANCELLED/UNPAID         CANCELLED/REFUNDED
//! ```

use super::{ensure_caller, member};
use crate::booking::{BookingResponse, CancelBookingRequest, CreateBookingRequest};
use crate::server::AppState;
use crate::types::BookingId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_web::{CallerId, CorrelationId, WebResult};
use serde::{Deserialize, Serialize};

/// Body of a cancel request
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CancelBody {
    /// Optional reason
    #[serde(default)]
    pub reason: Option<String>,
}

/// Book and pay in one step.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   -H "X-Member-Id: <member uuid>" \
///   -H "Content-Type: application/json" \
///   -d '{"memberId":"<member uuid>","showingId":"<showing uuid>","seatCodes":["A1","A2"]}'
/// ```
///
/// # Errors
///
/// 403 when `memberId` is not the caller, otherwise the mapped booking error.
pub async fn create_booking(
    State(state): State<AppState>,
    caller: CallerId,
    correlation_id: CorrelationId,
    Json(request): Json<CreateBookingRequest>,
) -> WebResult<(StatusCode, Json<BookingResponse>)> {
    ensure_caller(caller, request.member_id)?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        member_id = %request.member_id,
        showing_id = %request.showing_id,
        seats = ?request.seat_codes,
        "Create booking requested"
    );
    let booking = state.app.orchestrator().create_booking(request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Hold seats for later payment.
///
/// # Errors
///
/// As [`create_booking`].
pub async fn hold_seats(
    State(state): State<AppState>,
    caller: CallerId,
    correlation_id: CorrelationId,
    Json(request): Json<CreateBookingRequest>,
) -> WebResult<(StatusCode, Json<BookingResponse>)> {
    ensure_caller(caller, request.member_id)?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        member_id = %request.member_id,
        showing_id = %request.showing_id,
        seats = ?request.seat_codes,
        "Seat hold requested"
    );
    let booking = state.app.orchestrator().hold_seats(request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Pay a held booking.
///
/// # Errors
///
/// 403 for someone else's booking, otherwise the mapped booking error.
pub async fn pay_booking(
    State(state): State<AppState>,
    caller: CallerId,
    Path(booking_id): Path<BookingId>,
) -> WebResult<Json<BookingResponse>> {
    let booking = state
        .app
        .orchestrator()
        .pay_booking(member(caller), booking_id)
        .await?;
    Ok(Json(booking))
}

/// Cancel a booking.
///
/// # Errors
///
/// 403 for someone else's booking, 409 for a completed one.
pub async fn cancel_booking(
    State(state): State<AppState>,
    caller: CallerId,
    Path(booking_id): Path<BookingId>,
    Json(body): Json<CancelBody>,
) -> WebResult<Json<BookingResponse>> {
    let booking = state
        .app
        .orchestrator()
        .cancel_booking(
            member(caller),
            CancelBookingRequest {
                booking_id,
                reason: body.reason,
            },
        )
        .await?;
    Ok(Json(booking))
}

/// Fetch one booking.
///
/// # Errors
///
/// 404 for an unknown id, 403 for someone else's booking.
pub async fn get_booking(
    State(state): State<AppState>,
    caller: CallerId,
    Path(booking_id): Path<BookingId>,
) -> WebResult<Json<BookingResponse>> {
    let booking = state
        .app
        .orchestrator()
        .booking_for(member(caller), booking_id)
        .await?;
    Ok(Json(booking))
}

/// The caller's bookings, oldest first.
///
/// # Errors
///
/// 401 without a caller header.
pub async fn list_bookings(
    State(state): State<AppState>,
    caller: CallerId,
) -> WebResult<Json<Vec<BookingResponse>>> {
    let bookings = state
        .app
        .orchestrator()
        .bookings_for_member(member(caller))
        .await;
    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}
