//! Business metrics for the booking core.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_bookings_total{status}` - Bookings by outcome
//!   (held, confirmed, failed, cancelled, expired, completed)
//! - `boxoffice_seat_locks_total{outcome}` - Seat lock operations
//!   (locked, unavailable, committed, expired, released)
//! - `boxoffice_seat_locks_swept_total` - Lapsed seat locks reclaimed by the sweeper
//! - `boxoffice_wallet_debits_cents_total` - Money charged to wallets
//! - `boxoffice_wallet_refunds_cents_total` - Money returned to wallets
//! - `boxoffice_discount_redemptions_total{outcome}` - Discount redemptions
//!   (applied, used_up, rejected, conflict, released)
//! - `boxoffice_compensations_total{action,outcome}` - Compensating actions after a failed step
//!
//! ## Histograms
//! - `boxoffice_booking_duration_seconds` - Time to run a create or pay flow

use crate::types::Money;
use metrics::{describe_counter, describe_histogram};

/// Register descriptions for all business metrics.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_bookings_total",
        "Bookings by status (held, confirmed, failed, cancelled, expired, completed)"
    );
    describe_histogram!(
        "boxoffice_booking_duration_seconds",
        "Time taken to run a booking create or pay flow"
    );
    describe_counter!(
        "boxoffice_seat_locks_total",
        "Seat lock operations by outcome"
    );
    describe_counter!(
        "boxoffice_seat_locks_swept_total",
        "Lapsed seat locks reclaimed by the sweeper"
    );
    describe_counter!(
        "boxoffice_wallet_debits_cents_total",
        "Total amount debited from wallets in cents"
    );
    describe_counter!(
        "boxoffice_wallet_refunds_cents_total",
        "Total amount refunded to wallets in cents"
    );
    describe_counter!(
        "boxoffice_discount_redemptions_total",
        "Discount redemptions by outcome"
    );
    describe_counter!(
        "boxoffice_compensations_total",
        "Compensating actions by action and outcome"
    );

    tracing::info!("Business metrics registered");
}

/// Record a booking reaching `status`.
pub fn record_booking(status: &'static str) {
    metrics::counter!("boxoffice_bookings_total", "status" => status).increment(1);
}

/// Record how long a booking flow took.
pub fn record_booking_duration(duration_secs: f64) {
    metrics::histogram!("boxoffice_booking_duration_seconds").record(duration_secs);
}

/// Record a seat lock operation outcome.
pub fn record_seat_lock(outcome: &'static str) {
    metrics::counter!("boxoffice_seat_locks_total", "outcome" => outcome).increment(1);
}

/// Record seats reclaimed by a sweep.
pub fn record_seat_locks_swept(count: usize) {
    metrics::counter!("boxoffice_seat_locks_swept_total")
        .increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record a wallet debit.
pub fn record_wallet_debit(amount: Money) {
    metrics::counter!("boxoffice_wallet_debits_cents_total").increment(amount.cents());
}

/// Record a wallet refund.
pub fn record_wallet_refund(amount: Money) {
    metrics::counter!("boxoffice_wallet_refunds_cents_total").increment(amount.cents());
}

/// Record a discount redemption outcome.
pub fn record_discount_redemption(outcome: &'static str) {
    metrics::counter!("boxoffice_discount_redemptions_total", "outcome" => outcome).increment(1);
}

/// Record a compensating action.
pub fn record_compensation(action: &'static str, outcome: &'static str) {
    metrics::counter!("boxoffice_compensations_total", "action" => action, "outcome" => outcome)
        .increment(1);
    tracing::debug!(action, outcome, "Recorded compensation metric");
}
