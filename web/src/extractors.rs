//! Custom Axum extractors.
//!
//! - `CallerId`: the authenticated member, as asserted by the upstream gateway
//! - `CorrelationId`: extract or generate request correlation IDs
//!
//! Authentication itself happens before requests reach this service; the
//! gateway forwards the verified member id in the `X-Member-Id` header.
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     caller: CallerId,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(caller = %caller.0, correlation = %correlation_id.0, "Handling request");
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use uuid::Uuid;

/// Header carrying the authenticated member id.
pub const CALLER_HEADER: &str = "x-member-id";

/// Header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Authenticated caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Self)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("missing {CALLER_HEADER} header")))?;

    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| AppError::unauthorized(format!("malformed {CALLER_HEADER} header")))
}

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
