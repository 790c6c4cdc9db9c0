//! The booking entity, its lifecycle, and the request/response shapes.

use crate::discount::Redemption;
use crate::seats::LockHandle;
use crate::types::{BookingId, LedgerEntryId, MemberId, Money, SeatCode, ShowingId};
use boxoffice_core::{IllegalTransition, StateMachine};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Booking status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Seats held, not yet paid
    Pending,
    /// Paid and seats sold
    Confirmed,
    /// The screening was attended
    Completed,
    /// Cancelled, failed or expired
    Cancelled,
}

/// Payment status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Nothing charged
    Unpaid,
    /// Charged (or nothing was due)
    Paid,
    /// Charge reversed
    Refunded,
    /// The payment flow failed
    Failed,
}

/// Booking lifecycle events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingEvent {
    /// A discount redemption was taken for this booking
    DiscountRedeemed {
        /// The redemption
        redemption: Redemption,
    },
    /// Payment went through and the seats are sold
    Confirm {
        /// The wallet payment entry; `None` when nothing was due
        ledger_entry: Option<LedgerEntryId>,
        /// When
        at: DateTime<Utc>,
    },
    /// The pay flow failed and was rolled back
    Fail {
        /// What went wrong
        reason: String,
        /// A debit the rollback could not refund
        unrefunded: Option<LedgerEntryId>,
        /// When
        at: DateTime<Utc>,
    },
    /// The payment was reversed
    Refund {
        /// When
        at: DateTime<Utc>,
    },
    /// Cancelled by the member or expired by the system
    Cancel {
        /// Why
        reason: String,
        /// When
        at: DateTime<Utc>,
    },
    /// The member attended
    Complete {
        /// When
        at: DateTime<Utc>,
    },
    /// A compensation could not be completed
    FlagForReconciliation {
        /// What is inconsistent
        reason: String,
        /// When
        at: DateTime<Utc>,
    },
}

/// A member's booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking id; also the holder of its seat locks
    pub id: BookingId,
    /// Human-readable number, `BK<yyyymmdd>-<seq>`
    pub number: String,
    /// Owner
    pub member_id: MemberId,
    /// Showing
    pub showing_id: ShowingId,
    /// Seat hold; seats in ascending order
    pub lock: LockHandle,
    /// Sum of seat prices
    pub total_amount: Money,
    /// Discount granted
    pub discount_amount: Money,
    /// `total_amount - discount_amount`
    pub final_amount: Money,
    /// Discount code submitted with the request
    pub discount_code: Option<String>,
    /// Redemption held by this booking
    pub redemption: Option<Redemption>,
    /// Free-text requests
    pub special_requests: Option<String>,
    /// Status
    pub status: BookingStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Wallet payment entry
    pub ledger_entry: Option<LedgerEntryId>,
    /// Why the booking was cancelled or failed
    pub cancellation_reason: Option<String>,
    /// Set when a compensation failed and money may be out of place
    pub requires_reconciliation: Option<String>,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The booked seats
    #[must_use]
    pub fn seats(&self) -> &[SeatCode] {
        &self.lock.seats
    }

    /// Whether a pending booking has outlived `timeout` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.status == BookingStatus::Pending && self.created_at + timeout <= now
    }
}

impl StateMachine for Booking {
    type Event = BookingEvent;

    fn apply(&mut self, event: BookingEvent) -> Result<(), IllegalTransition> {
        use BookingStatus as S;
        use PaymentStatus as P;

        match (self.status, self.payment_status, event) {
            (S::Pending, P::Unpaid, BookingEvent::DiscountRedeemed { redemption })
                if self.redemption.is_none() =>
            {
                self.discount_amount = redemption.amount;
                self.final_amount = self.total_amount.saturating_sub(redemption.amount);
                self.redemption = Some(redemption);
            }
            (S::Pending, P::Unpaid, BookingEvent::Confirm { ledger_entry, at }) => {
                self.status = S::Confirmed;
                self.payment_status = P::Paid;
                self.ledger_entry = ledger_entry;
                self.updated_at = at;
            }
            (S::Pending, P::Unpaid, BookingEvent::Fail { reason, unrefunded, at }) => {
                self.status = S::Cancelled;
                self.payment_status = P::Failed;
                self.ledger_entry = unrefunded;
                self.redemption = None;
                self.cancellation_reason = Some(reason);
                self.updated_at = at;
            }
            (S::Confirmed, P::Paid, BookingEvent::Refund { at }) => {
                self.payment_status = P::Refunded;
                self.updated_at = at;
            }
            (S::Pending | S::Confirmed, payment, BookingEvent::Cancel { reason, at })
                if payment != P::Paid =>
            {
                self.status = S::Cancelled;
                self.redemption = None;
                self.cancellation_reason = Some(reason);
                self.updated_at = at;
            }
            (S::Confirmed, P::Paid, BookingEvent::Complete { at }) => {
                self.status = S::Completed;
                self.updated_at = at;
            }
            (_, _, BookingEvent::FlagForReconciliation { reason, at }) => {
                self.requires_reconciliation = Some(match self.requires_reconciliation.take() {
                    Some(earlier) => format!("{earlier}; {reason}"),
                    None => reason,
                });
                self.updated_at = at;
            }
            (status, payment, event) => {
                return Err(IllegalTransition::new("booking", &(status, payment), &event));
            }
        }
        Ok(())
    }
}

/// Booking numbers, `BK` + venue-local date + `-` + a per-day sequence of at
/// least six digits.
#[derive(Debug)]
pub struct BookingNumbers {
    venue_offset: FixedOffset,
    issued: DashMap<NaiveDate, u64>,
}

impl BookingNumbers {
    /// Start with no numbers issued.
    #[must_use]
    pub fn new(venue_offset: FixedOffset) -> Self {
        Self {
            venue_offset,
            issued: DashMap::new(),
        }
    }

    /// Next number for a booking created at `at`.
    ///
    /// The sequence restarts at 1 on every venue-local day and widens past
    /// six digits rather than wrapping.
    pub fn next(&self, at: DateTime<Utc>) -> String {
        let day = at.with_timezone(&self.venue_offset).date_naive();
        let seq = {
            let mut issued = self.issued.entry(day).or_insert(0);
            *issued += 1;
            *issued
        };
        format!("BK{}-{seq:06}", day.format("%Y%m%d"))
    }
}

/// Request to book (or hold) seats
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Member placing the booking
    pub member_id: MemberId,
    /// Showing
    pub showing_id: ShowingId,
    /// One to four distinct seat codes
    pub seat_codes: Vec<String>,
    /// Optional discount code
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Optional free-text requests
    #[serde(default)]
    pub special_requests: Option<String>,
}

/// Request to cancel a booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    /// Booking to cancel
    pub booking_id: BookingId,
    /// Why
    #[serde(default)]
    pub reason: Option<String>,
}

/// Booking as returned to callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    /// Booking id
    pub booking_id: BookingId,
    /// Booking number
    pub booking_number: String,
    /// Status
    pub status: BookingStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Sum of seat prices
    pub total_amount: Money,
    /// Discount granted
    pub discount_amount: Money,
    /// Amount charged
    pub final_amount: Money,
    /// Seats, ascending
    pub seat_codes: Vec<SeatCode>,
    /// Showing
    pub showing_id: ShowingId,
    /// When the seat hold lapses while the booking is pending
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            booking_number: booking.number.clone(),
            status: booking.status,
            payment_status: booking.payment_status,
            total_amount: booking.total_amount,
            discount_amount: booking.discount_amount,
            final_amount: booking.final_amount,
            seat_codes: booking.lock.seats.clone(),
            showing_id: booking.showing_id,
            hold_expires_at: (booking.status == BookingStatus::Pending)
                .then_some(booking.lock.expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use boxoffice_testing::utc;

    fn pending() -> Booking {
        let now = utc(2025, 1, 6, 10, 0);
        let id = BookingId::new();
        Booking {
            id,
            number: "BK20250106-000001".to_string(),
            member_id: MemberId::new(),
            showing_id: ShowingId::new(),
            lock: LockHandle {
                showing_id: ShowingId::new(),
                holder: id,
                seats: vec![SeatCode::parse("A1").unwrap()],
                expires_at: now + chrono::Duration::minutes(10),
            },
            total_amount: Money::from_units(300),
            discount_amount: Money::ZERO,
            final_amount: Money::from_units(300),
            discount_code: None,
            redemption: None,
            special_requests: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            ledger_entry: None,
            cancellation_reason: None,
            requires_reconciliation: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_transitions() {
        let at = utc(2025, 1, 6, 10, 1);
        let mut booking = pending();
        booking
            .apply(BookingEvent::DiscountRedeemed {
                redemption: Redemption {
                    code: "SAVE50".to_string(),
                    member_id: booking.member_id,
                    amount: Money::from_units(50),
                },
            })
            .unwrap();
        assert_eq!(booking.final_amount, Money::from_units(250));

        booking.apply(BookingEvent::Confirm { ledger_entry: None, at }).unwrap();
        assert_eq!(
            (booking.status, booking.payment_status),
            (BookingStatus::Confirmed, PaymentStatus::Paid)
        );

        booking.apply(BookingEvent::Complete { at }).unwrap();
        assert!(booking.apply(BookingEvent::Cancel { reason: "late".to_string(), at }).is_err());
        assert!(booking.apply(BookingEvent::Refund { at }).is_err());
    }

    #[test]
    fn paid_booking_must_be_refunded_before_cancel() {
        let at = utc(2025, 1, 6, 10, 1);
        let mut booking = pending();
        booking
            .apply(BookingEvent::Confirm {
                ledger_entry: Some(LedgerEntryId::new()),
                at,
            })
            .unwrap();
        assert!(booking.apply(BookingEvent::Cancel { reason: "x".to_string(), at }).is_err());
        booking.apply(BookingEvent::Refund { at }).unwrap();
        booking.apply(BookingEvent::Cancel { reason: "x".to_string(), at }).unwrap();
        assert_eq!(
            (booking.status, booking.payment_status),
            (BookingStatus::Cancelled, PaymentStatus::Refunded)
        );
        assert!(booking.apply(BookingEvent::Cancel { reason: "again".to_string(), at }).is_err());
    }

    #[test]
    fn failure_cancels_and_marks_payment_failed() {
        let at = utc(2025, 1, 6, 10, 1);
        let mut booking = pending();
        booking
            .apply(BookingEvent::Fail {
                reason: "insufficient balance".to_string(),
                unrefunded: None,
                at,
            })
            .unwrap();
        assert_eq!(
            (booking.status, booking.payment_status),
            (BookingStatus::Cancelled, PaymentStatus::Failed)
        );
        assert_eq!(booking.ledger_entry, None);
        assert!(booking.apply(BookingEvent::Confirm { ledger_entry: None, at }).is_err());
    }

    #[test]
    fn reconciliation_reasons_accumulate() {
        let at = utc(2025, 1, 6, 10, 1);
        let mut booking = pending();
        for reason in ["debit not refunded", "seats not released"] {
            booking
                .apply(BookingEvent::FlagForReconciliation {
                    reason: reason.to_string(),
                    at,
                })
                .unwrap();
        }
        assert_eq!(
            booking.requires_reconciliation.as_deref(),
            Some("debit not refunded; seats not released")
        );
    }

    #[test]
    fn failure_keeps_the_unrefunded_debit() {
        let at = utc(2025, 1, 6, 10, 1);
        let debit = LedgerEntryId::new();
        let mut booking = pending();
        booking
            .apply(BookingEvent::Fail {
                reason: "seat commit failed".to_string(),
                unrefunded: Some(debit),
                at,
            })
            .unwrap();
        assert_eq!(booking.ledger_entry, Some(debit));
    }

    #[test]
    fn pending_staleness() {
        let booking = pending();
        let timeout = chrono::Duration::minutes(15);
        assert!(!booking.is_stale(utc(2025, 1, 6, 10, 14), timeout));
        assert!(booking.is_stale(utc(2025, 1, 6, 10, 15), timeout));
    }

    #[test]
    fn booking_numbers_use_venue_date() {
        let numbers = BookingNumbers::new(FixedOffset::east_opt(9 * 3600).unwrap());
        // 20:00 UTC on the 6th is the 7th in UTC+9.
        assert_eq!(numbers.next(utc(2025, 1, 6, 20, 0)), "BK20250107-000001");
        assert_eq!(numbers.next(utc(2025, 1, 6, 20, 0)), "BK20250107-000002");
    }

    #[test]
    fn booking_numbers_restart_each_venue_day() {
        let numbers = BookingNumbers::new(FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(numbers.next(utc(2025, 1, 6, 14, 0)), "BK20250106-000001");
        assert_eq!(numbers.next(utc(2025, 1, 6, 14, 30)), "BK20250106-000002");
        // 15:00 UTC is midnight in UTC+9.
        assert_eq!(numbers.next(utc(2025, 1, 6, 15, 0)), "BK20250107-000001");
        // A late booking for the earlier day continues that day's sequence.
        assert_eq!(numbers.next(utc(2025, 1, 6, 14, 59)), "BK20250106-000003");
    }

    #[test]
    fn response_serializes_in_camel_case() {
        let json = serde_json::to_value(BookingResponse::from(&pending())).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["paymentStatus"], "UNPAID");
        assert_eq!(json["finalAmount"], 30_000);
        assert_eq!(json["seatCodes"][0], "A1");
    }
}
