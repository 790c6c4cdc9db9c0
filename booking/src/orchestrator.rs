//! Booking orchestration.
//!
//! Drives one booking through lock → price → redeem → debit → commit →
//! confirm. The steps touch separate ledgers, so each failure after a
//! side-effecting step is undone by compensating actions in reverse order:
//!
//! | Failed step        | Compensation                                     |
//! |--------------------|--------------------------------------------------|
//! | pricing / quote    | release seats                                    |
//! | discount redeem    | release seats                                    |
//! | wallet debit       | release redemption, release seats                |
//! | seat commit        | refund debit, release redemption, release seats  |
//!
//! Compensations are retried with backoff. Any compensation that still fails
//! flags the booking for reconciliation; a failed refund also surfaces
//! [`BookingError::CompensationFailed`].
//!
//! Lock order is always booking → seats (ascending) and booking → wallet;
//! seat and wallet mutexes are never held at the same time.

use crate::booking::{
    Booking, BookingEvent, BookingNumbers, BookingResponse, BookingStatus, CancelBookingRequest,
    CreateBookingRequest, PaymentStatus,
};
use crate::collaborators::{Catalog, MemberDirectory};
use crate::config::Config;
use crate::discount::{DiscountEngine, Redemption};
use crate::error::{BookingError, Result};
use crate::metrics::{record_booking, record_booking_duration, record_compensation};
use crate::pricing::PricingEngine;
use crate::seats::{LockHandle, SeatLedger};
use crate::types::{BookingId, LedgerEntryId, MemberId, Money, SeatCode, Showing};
use crate::wallet::WalletLedger;
use boxoffice_core::StateMachine;
use boxoffice_core::environment::Clock;
use boxoffice_runtime::{EntityTable, RetryExhausted, RetryPolicy, retry_with_predicate};
use dashmap::DashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

/// Reason recorded on bookings the expirer cancels.
pub const EXPIRED_REASON: &str = "payment window elapsed";

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    /// Seat lock lifetime
    pub seat_hold_ttl: Duration,
    /// Pending booking lifetime
    pub pending_timeout: Duration,
    /// Seats allowed per booking
    pub max_seats: usize,
    /// Booking mutex wait bound
    pub lock_wait: Duration,
    /// Retry policy for compensations
    pub compensation: RetryPolicy,
}

impl BookingSettings {
    /// Derive settings from the application config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            seat_hold_ttl: config.booking.seat_hold_ttl(),
            pending_timeout: config.booking.pending_timeout(),
            max_seats: config.booking.max_seats,
            lock_wait: config.booking.lock_wait(),
            compensation: config.compensation.retry_policy(),
        }
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything the orchestrator depends on.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Showing catalog
    pub catalog: Arc<dyn Catalog>,
    /// Member directory
    pub members: Arc<dyn MemberDirectory>,
    /// Seat ledger
    pub seats: Arc<SeatLedger>,
    /// Discount engine
    pub discounts: Arc<DiscountEngine>,
    /// Wallet ledger
    pub wallets: Arc<WalletLedger>,
    /// Pricing
    pub pricing: PricingEngine,
}

/// Coordinates the ledgers for every booking operation.
pub struct BookingOrchestrator {
    env: BookingEnvironment,
    settings: BookingSettings,
    bookings: EntityTable<BookingId, Booking>,
    by_member: DashMap<MemberId, Vec<BookingId>>,
    numbers: BookingNumbers,
}

impl std::fmt::Debug for BookingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingOrchestrator")
            .field("bookings", &self.bookings)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BookingOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(env: BookingEnvironment, settings: BookingSettings) -> Self {
        let numbers = BookingNumbers::new(env.pricing.venue_offset());
        Self {
            bookings: EntityTable::new("booking", settings.lock_wait),
            by_member: DashMap::new(),
            numbers,
            env,
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Book and pay in one call.
    ///
    /// On success the booking is `Confirmed`/`Paid` and its seats are
    /// `Booked`. On failure every side effect is rolled back; the booking, if
    /// one was created, is left `Cancelled`/`Failed`.
    ///
    /// # Errors
    ///
    /// Any validation, availability, discount or wallet error, or
    /// [`BookingError::CompensationFailed`] when a rollback could not complete.
    pub async fn create_booking(&self, request: CreateBookingRequest) -> Result<BookingResponse> {
        let started = Instant::now();
        let guard = self.open_booking(request).await?;
        let result = self.settle(guard).await;
        record_booking_duration(started.elapsed().as_secs_f64());
        result
    }

    /// First phase of a two-phase booking: lock and price the seats.
    ///
    /// The booking stays `Pending`/`Unpaid` until [`Self::pay_booking`] runs
    /// or the expirer cancels it. Discounts are priced but not redeemed.
    ///
    /// # Errors
    ///
    /// Validation, availability, or discount errors.
    pub async fn hold_seats(&self, request: CreateBookingRequest) -> Result<BookingResponse> {
        let guard = self.open_booking(request).await?;
        Ok(BookingResponse::from(&*guard))
    }

    /// Second phase: pay for a held booking. Paying a confirmed booking again
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotOwner`] for someone else's booking,
    /// [`BookingError::IllegalTransition`] for a cancelled one, otherwise the
    /// same errors as [`Self::create_booking`].
    pub async fn pay_booking(
        &self,
        caller: MemberId,
        booking_id: BookingId,
    ) -> Result<BookingResponse> {
        let started = Instant::now();
        let guard = self.bookings.lock(&booking_id).await?;
        Self::check_owner(&guard, caller)?;
        let result = self.settle(guard).await;
        record_booking_duration(started.elapsed().as_secs_f64());
        result
    }

    /// Cancel a booking, refunding it if paid. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotOwner`] for someone else's booking
    /// - [`BookingError::IllegalTransition`] for a completed booking
    /// - the refund error when the money could not be returned; the booking
    ///   is left unchanged so the call can be retried
    pub async fn cancel_booking(
        &self,
        caller: MemberId,
        request: CancelBookingRequest,
    ) -> Result<BookingResponse> {
        let mut guard = self.bookings.lock(&request.booking_id).await?;
        Self::check_owner(&guard, caller)?;
        let booking_id = guard.id;

        match guard.status {
            BookingStatus::Cancelled => {
                tracing::debug!(%booking_id, "Booking already cancelled");
                return Ok(BookingResponse::from(&*guard));
            }
            BookingStatus::Completed => {
                return Err(boxoffice_core::IllegalTransition::new(
                    "booking",
                    &(guard.status, guard.payment_status),
                    &"Cancel",
                )
                .into());
            }
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }

        if guard.payment_status == PaymentStatus::Paid {
            if let Some(entry_id) = guard.ledger_entry {
                self.compensate("refund", booking_id, || self.env.wallets.refund(entry_id))
                    .await
                    .map_err(|exhausted| exhausted.last_error)?;
            }
            guard.apply(BookingEvent::Refund { at: self.env.clock.now() })?;
        }

        let reason = request.reason.unwrap_or_else(|| "cancelled by member".to_string());
        let redemption = guard.redemption.clone();
        let lock = guard.lock.clone();
        guard.apply(BookingEvent::Cancel {
            reason,
            at: self.env.clock.now(),
        })?;

        if let Some(redemption) = redemption {
            self.release_discount(&mut guard, &redemption).await;
        }
        self.release_seats(&mut guard, &lock).await;

        record_booking("cancelled");
        tracing::info!(
            %booking_id,
            number = %guard.number,
            payment = ?guard.payment_status,
            "Booking cancelled"
        );
        Ok(BookingResponse::from(&*guard))
    }

    /// Mark a confirmed booking as attended; its seats become `Occupied`.
    ///
    /// # Errors
    ///
    /// [`BookingError::IllegalTransition`] unless the booking is confirmed.
    pub async fn complete_booking(&self, booking_id: BookingId) -> Result<BookingResponse> {
        let mut guard = self.bookings.lock(&booking_id).await?;
        let mut next = guard.clone();
        next.apply(BookingEvent::Complete { at: self.env.clock.now() })?;
        self.env
            .seats
            .occupy(guard.showing_id, guard.seats(), booking_id)
            .await?;
        *guard = next;
        record_booking("completed");
        tracing::info!(%booking_id, number = %guard.number, "Booking completed");
        Ok(BookingResponse::from(&*guard))
    }

    /// Cancel every pending booking older than the pending timeout and free
    /// its seats. No money moves. Bookings busy with another operation are
    /// left for the next pass. Returns how many bookings were expired.
    pub async fn expire_stale_bookings(&self) -> usize {
        let now = self.env.clock.now();
        let timeout = chrono::Duration::from_std(self.settings.pending_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(1));

        let mut expired = 0;
        for booking_id in self.bookings.keys() {
            let Some(mut guard) = self.bookings.try_lock(&booking_id) else {
                continue;
            };
            if !guard.is_stale(now, timeout) {
                continue;
            }
            let lock = guard.lock.clone();
            if self
                .compensate("seat_release", booking_id, || self.env.seats.release(&lock))
                .await
                .is_err()
            {
                continue;
            }
            match guard.apply(BookingEvent::Cancel {
                reason: EXPIRED_REASON.to_string(),
                at: now,
            }) {
                Ok(()) => {
                    expired += 1;
                    record_booking("expired");
                    tracing::info!(
                        %booking_id,
                        number = %guard.number,
                        "Pending booking expired"
                    );
                }
                Err(err) => {
                    tracing::error!(%booking_id, error = %err, "Could not expire booking");
                }
            }
        }
        expired
    }

    /// Snapshot of a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Busy`].
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking> {
        Ok(self.bookings.snapshot(&booking_id).await?)
    }

    /// A booking as seen by its owner.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotOwner`] for someone else's booking, otherwise as
    /// [`Self::booking`].
    pub async fn booking_for(
        &self,
        caller: MemberId,
        booking_id: BookingId,
    ) -> Result<BookingResponse> {
        let booking = self.booking(booking_id).await?;
        Self::check_owner(&booking, caller)?;
        Ok(BookingResponse::from(&booking))
    }

    /// All bookings of a member, oldest first.
    pub async fn bookings_for_member(&self, member_id: MemberId) -> Vec<Booking> {
        let ids = self
            .by_member
            .get(&member_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            match self.bookings.snapshot(&id).await {
                Ok(booking) => bookings.push(booking),
                Err(err) => {
                    tracing::warn!(booking_id = %id, error = %err, "Skipping unreadable booking");
                }
            }
        }
        bookings
    }

    // ------------------------------------------------------------------
    // Flow steps
    // ------------------------------------------------------------------

    fn check_owner(booking: &Booking, caller: MemberId) -> Result<()> {
        if booking.member_id == caller {
            Ok(())
        } else {
            Err(BookingError::NotOwner { booking_id: booking.id })
        }
    }

    fn validate(&self, request: &CreateBookingRequest) -> Result<Vec<SeatCode>> {
        let count = request.seat_codes.len();
        if count == 0 || count > self.settings.max_seats {
            return Err(BookingError::InvalidRequest(format!(
                "between 1 and {} seats per booking, got {count}",
                self.settings.max_seats
            )));
        }
        let mut seen = HashSet::with_capacity(count);
        let mut codes = Vec::with_capacity(count);
        for raw in &request.seat_codes {
            let code = SeatCode::parse(raw)?;
            if !seen.insert(code.clone()) {
                return Err(BookingError::InvalidRequest(format!(
                    "seat {code} requested twice"
                )));
            }
            codes.push(code);
        }
        Ok(codes)
    }

    /// Validate, lock and price; persist a `Pending` booking and return it locked.
    async fn open_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<OwnedMutexGuard<Booking>> {
        let codes = self.validate(&request)?;
        let member_id = request.member_id;
        if !self.env.members.is_member_active(member_id).await? {
            return Err(BookingError::MemberNotActive { member_id });
        }

        let showing = self.env.catalog.get_showing(request.showing_id).await?;
        showing.check_bookable(self.env.clock.now())?;

        let discount_code = request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        let booking_id = BookingId::new();
        let lock = self
            .env
            .seats
            .lock(showing.id, &codes, booking_id, self.settings.seat_hold_ttl)
            .await?;

        let priced = self
            .price(&showing, &lock, member_id, discount_code.as_deref())
            .await;
        let (total, discount) = match priced {
            Ok(priced) => priced,
            Err(err) => {
                self.release_after_failure(&lock).await;
                return Err(err);
            }
        };

        let now = self.env.clock.now();
        let booking = Booking {
            id: booking_id,
            number: self.numbers.next(now),
            member_id,
            showing_id: showing.id,
            lock: lock.clone(),
            total_amount: total,
            discount_amount: discount,
            final_amount: total.saturating_sub(discount),
            discount_code,
            redemption: None,
            special_requests: request.special_requests,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            ledger_entry: None,
            cancellation_reason: None,
            requires_reconciliation: None,
            created_at: now,
            updated_at: now,
        };
        let number = booking.number.clone();

        if let Err(err) = self.bookings.insert(booking_id, booking) {
            self.release_after_failure(&lock).await;
            return Err(err.into());
        }
        self.by_member.entry(member_id).or_default().push(booking_id);
        let guard = self.bookings.lock(&booking_id).await?;

        record_booking("held");
        tracing::info!(
            %booking_id,
            %number,
            %member_id,
            showing_id = %showing.id,
            seats = ?lock.seats,
            total = %total,
            discount = %discount,
            "Seats held for booking"
        );
        Ok(guard)
    }

    /// Price the locked seats and quote the discount.
    async fn price(
        &self,
        showing: &Showing,
        lock: &LockHandle,
        member_id: MemberId,
        discount_code: Option<&str>,
    ) -> Result<(Money, Money)> {
        let mut seats = Vec::with_capacity(lock.seats.len());
        for code in &lock.seats {
            let class = self.env.catalog.get_seat_class(showing.id, code).await?;
            seats.push((code.clone(), class));
        }
        let quote = self.env.pricing.quote(showing, &seats);
        let discount = match discount_code {
            Some(code) => self.env.discounts.quote(code, member_id, quote.subtotal).await?,
            None => Money::ZERO,
        };
        Ok((quote.subtotal, discount))
    }

    /// Redeem, debit, commit and confirm a pending booking.
    async fn settle(&self, mut guard: OwnedMutexGuard<Booking>) -> Result<BookingResponse> {
        let booking_id = guard.id;
        match (guard.status, guard.payment_status) {
            (BookingStatus::Pending, PaymentStatus::Unpaid) => {}
            (BookingStatus::Confirmed | BookingStatus::Completed, PaymentStatus::Paid) => {
                tracing::debug!(%booking_id, "Booking already paid");
                return Ok(BookingResponse::from(&*guard));
            }
            (status, payment) => {
                return Err(boxoffice_core::IllegalTransition::new(
                    "booking",
                    &(status, payment),
                    &"Pay",
                )
                .into());
            }
        }

        if guard.lock.expires_at <= self.env.clock.now() {
            let err = BookingError::LockExpired { holder: booking_id };
            return Err(self.abort(&mut guard, err, None).await);
        }

        if let Some(code) = guard.discount_code.clone() {
            let redeemed = self
                .env
                .discounts
                .apply(&code, guard.member_id, guard.total_amount)
                .await;
            match redeemed {
                Ok(redemption) => {
                    if let Err(err) = guard.apply(BookingEvent::DiscountRedeemed {
                        redemption: redemption.clone(),
                    }) {
                        self.release_discount(&mut guard, &redemption).await;
                        return Err(self.abort(&mut guard, err.into(), None).await);
                    }
                }
                Err(err) => return Err(self.abort(&mut guard, err, None).await),
            }
        }

        let wallet_id = match self.env.members.get_wallet_id(guard.member_id).await {
            Ok(wallet_id) => wallet_id,
            Err(err) => return Err(self.abort(&mut guard, err, None).await),
        };

        let ledger_entry = if guard.final_amount.is_zero() {
            None
        } else {
            let debited = self
                .env
                .wallets
                .debit(wallet_id, guard.final_amount, &guard.number)
                .await;
            match debited {
                Ok(entry) => Some(entry.id),
                Err(err) => return Err(self.abort(&mut guard, err, None).await),
            }
        };

        if let Err(err) = self.env.seats.commit(&guard.lock).await {
            return Err(self.abort(&mut guard, err, ledger_entry).await);
        }

        if let Err(err) = guard.apply(BookingEvent::Confirm {
            ledger_entry,
            at: self.env.clock.now(),
        }) {
            return Err(self.abort(&mut guard, err.into(), ledger_entry).await);
        }

        record_booking("confirmed");
        tracing::info!(
            %booking_id,
            number = %guard.number,
            %wallet_id,
            charged = %guard.final_amount,
            "Booking confirmed"
        );
        Ok(BookingResponse::from(&*guard))
    }

    /// Roll back a failed settle and mark the booking failed. Returns the
    /// error to report: `cause`, or `CompensationFailed` if the refund failed.
    ///
    /// A debit that could not be refunded stays on the booking as its ledger
    /// entry so reconciliation can find the money.
    async fn abort(
        &self,
        booking: &mut Booking,
        cause: BookingError,
        debited: Option<LedgerEntryId>,
    ) -> BookingError {
        let booking_id = booking.id;
        let mut outcome = cause.clone();
        let mut unrefunded = None;

        if let Some(entry_id) = debited {
            if let Err(exhausted) = self
                .compensate("refund", booking_id, || self.env.wallets.refund(entry_id))
                .await
            {
                let reason = format!("debit {entry_id} not refunded: {}", exhausted.last_error);
                self.flag(booking, reason.clone());
                unrefunded = Some(entry_id);
                outcome = BookingError::CompensationFailed { booking_id, reason };
            }
        }

        if let Some(redemption) = booking.redemption.clone() {
            self.release_discount(booking, &redemption).await;
        }

        let lock = booking.lock.clone();
        self.release_seats(booking, &lock).await;

        if let Err(err) = booking.apply(BookingEvent::Fail {
            reason: cause.to_string(),
            unrefunded,
            at: self.env.clock.now(),
        }) {
            tracing::error!(%booking_id, error = %err, "Could not mark booking failed");
        }

        record_booking("failed");
        tracing::warn!(
            %booking_id,
            number = %booking.number,
            error = %cause,
            "Booking failed and was rolled back"
        );
        outcome
    }

    /// Give a redemption back, flagging the booking if that keeps failing.
    async fn release_discount(&self, booking: &mut Booking, redemption: &Redemption) {
        if let Err(exhausted) = self
            .compensate("discount_release", booking.id, || {
                self.env.discounts.release(redemption)
            })
            .await
        {
            let reason = format!(
                "discount {} not released: {}",
                redemption.code, exhausted.last_error
            );
            self.flag(booking, reason);
        }
    }

    /// Free the booking's seats, flagging the booking if that keeps failing.
    async fn release_seats(&self, booking: &mut Booking, lock: &LockHandle) {
        if let Err(exhausted) = self
            .compensate("seat_release", booking.id, || self.env.seats.release(lock))
            .await
        {
            self.flag(booking, format!("seats not released: {}", exhausted.last_error));
        }
    }

    fn flag(&self, booking: &mut Booking, reason: String) {
        let booking_id = booking.id;
        tracing::error!(%booking_id, %reason, "Booking needs reconciliation");
        if let Err(err) = booking.apply(BookingEvent::FlagForReconciliation {
            reason,
            at: self.env.clock.now(),
        }) {
            tracing::error!(%booking_id, error = %err, "Could not flag booking");
        }
    }

    async fn release_after_failure(&self, lock: &LockHandle) {
        let _ = self
            .compensate("seat_release", lock.holder, || self.env.seats.release(lock))
            .await;
    }

    /// Run a compensating action with the configured retry policy.
    async fn compensate<F, Fut, T>(
        &self,
        action: &'static str,
        booking_id: BookingId,
        op: F,
    ) -> std::result::Result<T, RetryExhausted<BookingError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.settings.compensation;
        match retry_with_predicate(policy, action, op, BookingError::is_retryable).await {
            Ok(value) => {
                record_compensation(action, "succeeded");
                Ok(value)
            }
            Err(exhausted) => {
                record_compensation(action, "failed");
                tracing::error!(
                    %booking_id,
                    action,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Compensating action failed"
                );
                Err(exhausted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::collaborators::{InMemoryCatalog, InMemoryMembers};
    use crate::discount::{DiscountCode, DiscountKind};
    use crate::types::{SeatClass, ShowingId, ShowingStatus, WalletId};
    use crate::wallet::WalletLimits;
    use boxoffice_testing::{ManualClock, utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        orchestrator: BookingOrchestrator,
        wallets: Arc<WalletLedger>,
        seats: Arc<SeatLedger>,
        discounts: Arc<DiscountEngine>,
        showing_id: ShowingId,
        member: MemberId,
        wallet: WalletId,
    }

    fn fixture(balance_units: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(utc(2025, 1, 6, 10, 0)));
        let catalog = Arc::new(InMemoryCatalog::new());
        let members = Arc::new(InMemoryMembers::new());
        let wait = Duration::from_millis(200);
        let seats = Arc::new(SeatLedger::new(clock.clone(), catalog.clone(), wait));
        let wallets = Arc::new(WalletLedger::new(clock.clone(), wait));
        let discounts = Arc::new(DiscountEngine::new(clock.clone(), wait, 4));

        let showing_id = ShowingId::new();
        let seat_map = vec![
            (SeatCode::parse("A1").unwrap(), SeatClass::Vip),
            (SeatCode::parse("A2").unwrap(), SeatClass::Regular),
        ];
        catalog
            .add_showing(
                Showing {
                    id: showing_id,
                    title: "Test".to_string(),
                    starts_at: utc(2025, 1, 6, 14, 0),
                    base_price: Money::from_units(200),
                    total_seats: 2,
                    available_seats: 2,
                    sale_opens_at: utc(2025, 1, 1, 0, 0),
                    last_bookable_at: utc(2025, 1, 6, 13, 45),
                    status: ShowingStatus::OnSale,
                },
                &seat_map,
            )
            .unwrap();
        seats.register_showing(showing_id, &seat_map).unwrap();

        let member = MemberId::new();
        let wallet = wallets
            .open_wallet(member, WalletLimits::default(), Money::from_units(balance_units))
            .unwrap();
        members.enroll(member, wallet.id);

        let settings = BookingSettings {
            compensation: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .jitter(false)
                .build(),
            ..BookingSettings::default()
        };
        let orchestrator = BookingOrchestrator::new(
            BookingEnvironment {
                clock: clock.clone(),
                catalog,
                members,
                seats: seats.clone(),
                discounts: discounts.clone(),
                wallets: wallets.clone(),
                pricing: PricingEngine::default(),
            },
            settings,
        );
        Fixture {
            clock,
            orchestrator,
            wallets,
            seats,
            discounts,
            showing_id,
            member,
            wallet: wallet.id,
        }
    }

    fn request(f: &Fixture, seats: &[&str]) -> CreateBookingRequest {
        CreateBookingRequest {
            member_id: f.member,
            showing_id: f.showing_id,
            seat_codes: seats.iter().map(ToString::to_string).collect(),
            discount_code: None,
            special_requests: None,
        }
    }

    #[tokio::test]
    async fn rejects_malformed_seat_lists() {
        let f = fixture(1_000);
        for seats in [&[][..], &["A1", "a1"][..], &["A1", "A2", "A3", "A4", "A5"][..]] {
            assert!(matches!(
                f.orchestrator.create_booking(request(&f, seats)).await,
                Err(BookingError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn two_phase_hold_then_pay() {
        let f = fixture(1_000);
        let held = f.orchestrator.hold_seats(request(&f, &["A1"])).await.unwrap();
        assert_eq!(
            (held.status, held.payment_status),
            (BookingStatus::Pending, PaymentStatus::Unpaid)
        );
        assert_eq!(held.final_amount, Money::from_units(300));
        assert_eq!(f.wallets.wallet(f.wallet).await.unwrap().balance, Money::from_units(1_000));

        let paid = f.orchestrator.pay_booking(f.member, held.booking_id).await.unwrap();
        assert_eq!(
            (paid.status, paid.payment_status),
            (BookingStatus::Confirmed, PaymentStatus::Paid)
        );
        assert_eq!(f.wallets.wallet(f.wallet).await.unwrap().balance, Money::from_units(700));

        // Paying again changes nothing.
        let again = f.orchestrator.pay_booking(f.member, held.booking_id).await.unwrap();
        assert_eq!(again, paid);
        assert_eq!(f.wallets.wallet(f.wallet).await.unwrap().balance, Money::from_units(700));
    }

    #[tokio::test]
    async fn paying_after_hold_lapsed_moves_no_money() {
        let f = fixture(1_000);
        let held = f.orchestrator.hold_seats(request(&f, &["A1"])).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(11));

        let err = f.orchestrator.pay_booking(f.member, held.booking_id).await.unwrap_err();
        assert_eq!(err, BookingError::LockExpired { holder: held.booking_id });
        assert_eq!(f.wallets.entries(f.wallet).await.unwrap().len(), 1);
        let booking = f.orchestrator.booking(held.booking_id).await.unwrap();
        assert_eq!(
            (booking.status, booking.payment_status),
            (BookingStatus::Cancelled, PaymentStatus::Failed)
        );
        assert_eq!(f.seats.availability(f.showing_id).unwrap().available, 2);
    }

    #[tokio::test]
    async fn only_the_owner_may_pay_or_cancel() {
        let f = fixture(1_000);
        let held = f.orchestrator.hold_seats(request(&f, &["A1"])).await.unwrap();
        let stranger = MemberId::new();
        assert!(matches!(
            f.orchestrator.pay_booking(stranger, held.booking_id).await,
            Err(BookingError::NotOwner { .. })
        ));
        assert!(matches!(
            f.orchestrator
                .cancel_booking(
                    stranger,
                    CancelBookingRequest {
                        booking_id: held.booking_id,
                        reason: None
                    }
                )
                .await,
            Err(BookingError::NotOwner { .. })
        ));
    }

    #[tokio::test]
    async fn complete_occupies_seats_and_blocks_cancel() {
        let f = fixture(1_000);
        let booked = f.orchestrator.create_booking(request(&f, &["A2"])).await.unwrap();
        let done = f.orchestrator.complete_booking(booked.booking_id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert_eq!(f.seats.availability(f.showing_id).unwrap().occupied, 1);

        let err = f
            .orchestrator
            .cancel_booking(
                f.member,
                CancelBookingRequest {
                    booking_id: booked.booking_id,
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn completing_a_pending_booking_is_illegal() {
        let f = fixture(1_000);
        let held = f.orchestrator.hold_seats(request(&f, &["A2"])).await.unwrap();
        assert!(matches!(
            f.orchestrator.complete_booking(held.booking_id).await,
            Err(BookingError::IllegalTransition(_))
        ));
    }

    #[tokio::test]
    async fn stale_pending_bookings_expire() {
        let f = fixture(1_000);
        let held = f.orchestrator.hold_seats(request(&f, &["A1", "A2"])).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(14));
        assert_eq!(f.orchestrator.expire_stale_bookings().await, 0);
        f.clock.advance(chrono::Duration::minutes(1));
        assert_eq!(f.orchestrator.expire_stale_bookings().await, 1);

        let booking = f.orchestrator.booking(held.booking_id).await.unwrap();
        assert_eq!(
            (booking.status, booking.payment_status),
            (BookingStatus::Cancelled, PaymentStatus::Unpaid)
        );
        assert_eq!(booking.cancellation_reason.as_deref(), Some(EXPIRED_REASON));
        assert_eq!(f.seats.availability(f.showing_id).unwrap().available, 2);
        assert_eq!(f.orchestrator.expire_stale_bookings().await, 0);
    }

    #[tokio::test]
    async fn unreleased_discount_flags_the_cancelled_booking() {
        let f = fixture(1_000);
        f.discounts
            .register(DiscountCode {
                code: "half".to_string(),
                kind: DiscountKind::Percentage,
                value: 50,
                min_purchase: Money::ZERO,
                max_discount: None,
                valid_from: utc(2025, 1, 1, 0, 0),
                valid_until: utc(2025, 2, 1, 0, 0),
                per_member_limit: 1,
                usage_limit: 10,
                active: true,
            })
            .unwrap();
        let mut req = request(&f, &["A2"]);
        req.discount_code = Some("half".to_string());
        let booked = f.orchestrator.create_booking(req).await.unwrap();
        assert!(!booked.discount_amount.is_zero());

        // A reader holding the code record starves every release attempt.
        let record = f.discounts.record("HALF").unwrap();
        let reader = record.read().await;
        let cancelled = f
            .orchestrator
            .cancel_booking(
                f.member,
                CancelBookingRequest {
                    booking_id: booked.booking_id,
                    reason: None,
                },
            )
            .await
            .unwrap();
        drop(reader);

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        let booking = f.orchestrator.booking(booked.booking_id).await.unwrap();
        let reason = booking.requires_reconciliation.unwrap();
        assert!(reason.contains("discount HALF not released"), "{reason}");
        assert_eq!(f.discounts.usage("HALF").await.unwrap().used, 1);
        assert_eq!(f.seats.availability(f.showing_id).unwrap().available, 2);
    }

    #[tokio::test]
    async fn member_listing_returns_own_bookings() {
        let f = fixture(1_000);
        f.orchestrator.create_booking(request(&f, &["A1"])).await.unwrap();
        f.orchestrator.hold_seats(request(&f, &["A2"])).await.unwrap();
        assert_eq!(f.orchestrator.bookings_for_member(f.member).await.len(), 2);
        assert!(f.orchestrator.bookings_for_member(MemberId::new()).await.is_empty());
    }
}
