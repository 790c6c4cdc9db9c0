//! Error taxonomy for the booking core.
//!
//! Every ledger and the orchestrator return [`BookingError`]. Each variant
//! carries enough context to render a client message and a stable code; the
//! HTTP layer maps variants onto status codes in [`From<BookingError>`] for
//! [`AppError`].

use crate::types::{BookingId, MemberId, Money, SeatCode, ShowingId, WalletId, join_codes};
use crate::wallet::{LimitPeriod, WalletStatus};
use boxoffice_core::IllegalTransition;
use boxoffice_runtime::LockError;
use boxoffice_web::AppError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BookingError>;

/// Errors surfaced by booking operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Showing is not on sale or outside its sale window
    #[error("showing {showing_id} is not bookable: {reason}")]
    ScheduleNotBookable {
        /// Showing that was requested
        showing_id: ShowingId,
        /// Why it cannot be booked
        reason: String,
    },

    /// One or more requested seats are locked, booked or out of service
    #[error("seats not available: {}", join_codes(.seats))]
    SeatUnavailable {
        /// Showing the seats belong to
        showing_id: ShowingId,
        /// The seats that could not be taken
        seats: Vec<SeatCode>,
    },

    /// A seat lock lapsed before the booking was committed
    #[error("seat lock held by booking {holder} expired")]
    LockExpired {
        /// Booking that held the lock
        holder: BookingId,
    },

    /// Discount code is unknown, inactive, out of window, or its conditions are not met
    #[error("discount {code} rejected: {reason}")]
    DiscountInvalid {
        /// The submitted code
        code: String,
        /// Why it was rejected
        reason: String,
    },

    /// Global usage cap reached
    #[error("discount {code} has no redemptions left")]
    DiscountUsedUp {
        /// The submitted code
        code: String,
    },

    /// Wallet balance is below the charge
    #[error("wallet {wallet_id} balance {balance} is below {requested}")]
    InsufficientBalance {
        /// Wallet that was charged
        wallet_id: WalletId,
        /// Balance at the time of the attempt
        balance: Money,
        /// Amount requested
        requested: Money,
    },

    /// The charge would push a running total above its limit
    #[error("{period:?} limit {limit} exceeded on wallet {wallet_id}, total {attempted_total}")]
    LimitExceeded {
        /// Wallet that was charged
        wallet_id: WalletId,
        /// Which running total
        period: LimitPeriod,
        /// The configured limit
        limit: Money,
        /// Running total the charge would have produced
        attempted_total: Money,
    },

    /// Wallet is frozen, suspended or closed
    #[error("wallet {wallet_id} is {status:?}")]
    WalletNotUsable {
        /// Wallet that was used
        wallet_id: WalletId,
        /// Its current status
        status: WalletStatus,
    },

    /// Optimistic update lost every retry
    #[error("concurrent update conflict on {resource}")]
    ConcurrentConflict {
        /// What was contended
        resource: String,
    },

    /// A bounded lock wait elapsed; safe to retry
    #[error("{resource} is busy, retry later")]
    Busy {
        /// What was contended
        resource: String,
    },

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Member is unknown to the directory or not active
    #[error("member {member_id} is not active")]
    MemberNotActive {
        /// The member
        member_id: MemberId,
    },

    /// Entity lookup failed
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity
        entity: &'static str,
        /// Display rendering of its id
        id: String,
    },

    /// Entity registration collided with an existing one
    #[error("{entity} {id} already exists")]
    AlreadyExists {
        /// Kind of entity
        entity: &'static str,
        /// Display rendering of its id
        id: String,
    },

    /// Caller does not own the booking
    #[error("booking {booking_id} belongs to another member")]
    NotOwner {
        /// The booking
        booking_id: BookingId,
    },

    /// Event not allowed in the entity's current state
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// A money-moving step succeeded but its compensation could not be
    /// completed; the booking is flagged for reconciliation
    #[error("compensation for booking {booking_id} failed: {reason}")]
    CompensationFailed {
        /// Booking that needs reconciliation
        booking_id: BookingId,
        /// What went wrong
        reason: String,
    },

    /// Catalog or member directory failure
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl BookingError {
    /// Shorthand for [`BookingError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::ConcurrentConflict { .. } | Self::Collaborator(_)
        )
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ScheduleNotBookable { .. } => "SCHEDULE_NOT_BOOKABLE",
            Self::SeatUnavailable { .. } => "SEAT_UNAVAILABLE",
            Self::LockExpired { .. } => "LOCK_EXPIRED",
            Self::DiscountInvalid { .. } => "DISCOUNT_INVALID",
            Self::DiscountUsedUp { .. } => "DISCOUNT_USED_UP",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::WalletNotUsable { .. } => "WALLET_NOT_USABLE",
            Self::ConcurrentConflict { .. } => "CONCURRENT_CONFLICT",
            Self::Busy { .. } => "BUSY",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::MemberNotActive { .. } => "MEMBER_NOT_ACTIVE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            Self::CompensationFailed { .. } => "COMPENSATION_FAILED",
            Self::Collaborator(_) => "COLLABORATOR_FAILURE",
        }
    }
}

impl From<LockError> for BookingError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound { table, key } => Self::NotFound { entity: table, id: key },
            LockError::Duplicate { table, key } => Self::AlreadyExists { entity: table, id: key },
            LockError::Timeout { table, key, .. } => Self::Busy {
                resource: format!("{table} {key}"),
            },
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let app = match &err {
            BookingError::InvalidRequest(_) => Self::bad_request(message),
            BookingError::NotFound { entity, id } => Self::not_found(entity, id),
            BookingError::MemberNotActive { .. }
            | BookingError::NotOwner { .. }
            | BookingError::WalletNotUsable { .. } => {
                Self::new(axum::http::StatusCode::FORBIDDEN, message, code)
            }
            BookingError::DiscountInvalid { .. }
            | BookingError::InsufficientBalance { .. }
            | BookingError::LimitExceeded { .. } => Self::unprocessable(message, code),
            BookingError::ScheduleNotBookable { .. }
            | BookingError::SeatUnavailable { .. }
            | BookingError::LockExpired { .. }
            | BookingError::DiscountUsedUp { .. }
            | BookingError::AlreadyExists { .. }
            | BookingError::IllegalTransition(_) => Self::conflict(message, code),
            BookingError::ConcurrentConflict { .. } => Self::conflict(message, code).retryable(),
            BookingError::Busy { .. } | BookingError::Collaborator(_) => {
                Self::new(axum::http::StatusCode::SERVICE_UNAVAILABLE, message, code).retryable()
            }
            BookingError::CompensationFailed { .. } => {
                Self::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, message, code)
            }
        };
        app.with_source(anyhow::Error::new(err))
    }
}
