//! HTTP API handlers.
//!
//! Callers are identified by the `X-Member-Id` header the gateway sets after
//! authentication. Handlers never trust a member id found in a request body:
//! it must match the header or the request is rejected with 403.

pub mod bookings;
pub mod showings;
pub mod wallets;

use crate::types::MemberId;
use boxoffice_web::{AppError, CallerId, WebResult};

/// The caller as a member id.
pub(crate) const fn member(caller: CallerId) -> MemberId {
    MemberId::from_uuid(caller.0)
}

/// Reject a body naming someone other than the caller.
pub(crate) fn ensure_caller(caller: CallerId, claimed: MemberId) -> WebResult<MemberId> {
    let member_id = member(caller);
    if member_id == claimed {
        Ok(member_id)
    } else {
        Err(AppError::forbidden("memberId does not match the authenticated caller"))
    }
}
