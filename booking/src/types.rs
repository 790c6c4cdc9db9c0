//! Domain types shared across the booking core.
//!
//! Identifiers, seat codes and classes, and the catalog's view of a showing.
//! Entities refer to each other only through these ids; each entity is owned by
//! exactly one ledger and looked up there.

use crate::error::BookingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use boxoffice_core::Money;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create the id from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a member (the authenticated caller)
    MemberId
);
uuid_id!(
    /// Unique identifier for a showing (movie + venue + time slot)
    ShowingId
);
uuid_id!(
    /// Unique identifier for a booking; also the holder of its seat locks
    BookingId
);
uuid_id!(
    /// Unique identifier for a stored-value wallet
    WalletId
);
uuid_id!(
    /// Unique identifier for a ledger entry
    LedgerEntryId
);

// ============================================================================
// Seats
// ============================================================================

/// Longest accepted seat code.
pub const MAX_SEAT_CODE_LEN: usize = 16;

/// Seat code within a showing (e.g. `"A1"`). Ordered lexically, which is the
/// lock acquisition order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatCode(String);

impl SeatCode {
    /// Parse a seat code, trimming whitespace and upper-casing it.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidRequest`] for empty, over-long or
    /// non-alphanumeric codes.
    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(BookingError::InvalidRequest("seat code cannot be empty".to_string()));
        }
        if code.len() > MAX_SEAT_CODE_LEN {
            return Err(BookingError::InvalidRequest(format!(
                "seat code {code} is longer than {MAX_SEAT_CODE_LEN} characters"
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(BookingError::InvalidRequest(format!(
                "seat code {code} contains invalid characters"
            )));
        }
        Ok(Self(code))
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SeatCode {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SeatCode> for String {
    fn from(code: SeatCode) -> Self {
        code.0
    }
}

impl fmt::Display for SeatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a list of seat codes as `A1, A2`.
#[must_use]
pub fn join_codes(codes: &[SeatCode]) -> String {
    codes
        .iter()
        .map(SeatCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Seat class, which drives the price multiplier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClass {
    /// Standard seat
    Regular,
    /// VIP seat
    Vip,
    /// Two-person couple seat
    Couple,
    /// Accessible seat
    Handicap,
    /// Premium seat
    Premium,
    /// Student seat
    Student,
}

// ============================================================================
// Showings
// ============================================================================

/// Lifecycle of a showing, owned by the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowingStatus {
    /// Sales have not opened
    NotStarted,
    /// Tickets can be bought
    OnSale,
    /// Every seat is locked or booked
    Full,
    /// The showing is over
    Ended,
    /// Cancelled by the venue
    Cancelled,
}

/// Catalog snapshot of a showing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Showing {
    /// Showing identifier
    pub id: ShowingId,
    /// Display title (movie + room)
    pub title: String,
    /// When the screening starts
    pub starts_at: DateTime<Utc>,
    /// Price of a regular seat before surcharges
    pub base_price: Money,
    /// Total seat count
    pub total_seats: u32,
    /// Seats not booked or locked
    pub available_seats: u32,
    /// First instant tickets can be bought
    pub sale_opens_at: DateTime<Utc>,
    /// Last instant tickets can be bought
    pub last_bookable_at: DateTime<Utc>,
    /// Lifecycle status
    pub status: ShowingStatus,
}

impl Showing {
    /// Check the showing accepts new bookings at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::ScheduleNotBookable`] when the showing is not
    /// on sale or `now` is outside the sale window. A `Full` showing passes:
    /// its seats decide, and a lapsed hold may free one.
    pub fn check_bookable(&self, now: DateTime<Utc>) -> Result<(), BookingError> {
        let reason = if !matches!(self.status, ShowingStatus::OnSale | ShowingStatus::Full) {
            Some(format!("status is {:?}", self.status))
        } else if now < self.sale_opens_at {
            Some(format!("sales open at {}", self.sale_opens_at))
        } else if now >= self.last_bookable_at {
            Some(format!("sales closed at {}", self.last_bookable_at))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BookingError::ScheduleNotBookable {
                showing_id: self.id,
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;

    fn showing(status: ShowingStatus) -> Showing {
        let now = Utc::now();
        Showing {
            id: ShowingId::new(),
            title: "Test".to_string(),
            starts_at: now + Duration::hours(3),
            base_price: Money::from_units(300),
            total_seats: 10,
            available_seats: 10,
            sale_opens_at: now - Duration::days(1),
            last_bookable_at: now + Duration::hours(2),
            status,
        }
    }

    #[test]
    fn seat_code_is_normalised() {
        assert_eq!(SeatCode::parse(" a1 ").unwrap().as_str(), "A1");
    }

    #[test]
    fn seat_code_rejects_garbage() {
        assert!(SeatCode::parse("").is_err());
        assert!(SeatCode::parse("   ").is_err());
        assert!(SeatCode::parse("A 1").is_err());
        assert!(SeatCode::parse(&"X".repeat(MAX_SEAT_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn seat_code_orders_lexically() {
        let mut codes = vec![
            SeatCode::parse("B2").unwrap(),
            SeatCode::parse("A9").unwrap(),
            SeatCode::parse("A10").unwrap(),
        ];
        codes.sort();
        assert_eq!(join_codes(&codes), "A10, A9, B2");
    }

    #[test]
    fn seat_code_deserializes_through_parse() {
        let code: SeatCode = serde_json::from_str("\"c3\"").unwrap();
        assert_eq!(code.as_str(), "C3");
        assert!(serde_json::from_str::<SeatCode>("\"\"").is_err());
    }

    #[test]
    fn bookable_on_sale_or_full_inside_window() {
        let now = Utc::now();
        assert!(showing(ShowingStatus::OnSale).check_bookable(now).is_ok());
        assert!(showing(ShowingStatus::Full).check_bookable(now).is_ok());
        assert!(matches!(
            showing(ShowingStatus::Ended).check_bookable(now),
            Err(BookingError::ScheduleNotBookable { .. })
        ));

        let open = showing(ShowingStatus::OnSale);
        assert!(open.check_bookable(open.last_bookable_at).is_err());
        assert!(open.check_bookable(open.sale_opens_at - Duration::seconds(1)).is_err());
    }
}
