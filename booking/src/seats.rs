//! Seat ledger: per-showing seat inventory with time-bounded locks.
//!
//! Every seat sits behind its own async mutex. Multi-seat operations take the
//! seat mutexes in ascending [`SeatCode`] order, check every seat, and only
//! then mutate, so a selection is locked all-or-nothing and two overlapping
//! selections can never deadlock. Lock waits are bounded; a timeout surfaces
//! as [`BookingError::Busy`].
//!
//! Availability counters are maintained incrementally under the seat mutexes
//! and pushed to the catalog after each mutation. A hold that has lapsed but
//! not been swept yet is reported as available.

use crate::collaborators::Catalog;
use crate::error::{BookingError, Result};
use crate::metrics::record_seat_lock;
use crate::types::{BookingId, SeatClass, SeatCode, ShowingId};
use boxoffice_core::environment::Clock;
use boxoffice_core::{IllegalTransition, StateMachine};
use boxoffice_runtime::lock_within;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

const TABLE: &str = "seat";

// ============================================================================
// Seat entity
// ============================================================================

/// Seat state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    /// Free to lock
    Available,
    /// Held for a booking until `expires_at`
    #[serde(rename_all = "camelCase")]
    Locked {
        /// Booking holding the seat
        holder: BookingId,
        /// When the hold lapses
        expires_at: DateTime<Utc>,
    },
    /// Sold to a booking
    Booked {
        /// Owning booking
        holder: BookingId,
    },
    /// The ticket holder attended
    Occupied {
        /// Owning booking
        holder: BookingId,
    },
    /// Out of service
    Maintenance,
}

impl SeatStatus {
    /// Booking the seat belongs to, if any.
    #[must_use]
    pub const fn holder(&self) -> Option<BookingId> {
        match self {
            Self::Locked { holder, .. } | Self::Booked { holder } | Self::Occupied { holder } => {
                Some(*holder)
            }
            Self::Available | Self::Maintenance => None,
        }
    }

    const fn counter(&self) -> Counter {
        match self {
            Self::Available => Counter::Available,
            Self::Locked { .. } => Counter::Locked,
            Self::Booked { .. } => Counter::Booked,
            Self::Occupied { .. } => Counter::Occupied,
            Self::Maintenance => Counter::Maintenance,
        }
    }
}

/// Seat lifecycle events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeatEvent {
    /// Hold an available seat
    Lock {
        /// Booking taking the hold
        holder: BookingId,
        /// When the hold lapses
        expires_at: DateTime<Utc>,
    },
    /// Turn an unexpired hold into a sale
    Commit {
        /// Booking that holds the seat
        holder: BookingId,
        /// Evaluation instant
        now: DateTime<Utc>,
    },
    /// Give a held or sold seat back
    Release {
        /// Booking that holds the seat
        holder: BookingId,
    },
    /// Reclaim a lapsed hold
    Expire {
        /// Evaluation instant
        now: DateTime<Utc>,
    },
    /// Ticket holder attended
    Occupy {
        /// Owning booking
        holder: BookingId,
    },
    /// Take an available seat out of service
    StartMaintenance,
    /// Return a seat to service
    EndMaintenance,
}

/// One seat of one showing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    /// Showing
    pub showing_id: ShowingId,
    /// Seat code
    pub code: SeatCode,
    /// Seat class
    pub class: SeatClass,
    /// Current state
    pub status: SeatStatus,
}

impl Seat {
    /// Whether the seat is held by a lock that lapsed at or before `now`.
    #[must_use]
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SeatStatus::Locked { expires_at, .. } if expires_at <= now)
    }
}

impl StateMachine for Seat {
    type Event = SeatEvent;

    fn apply(&mut self, event: SeatEvent) -> std::result::Result<(), IllegalTransition> {
        let next = match (&self.status, &event) {
            (SeatStatus::Available, SeatEvent::Lock { holder, expires_at }) => SeatStatus::Locked {
                holder: *holder,
                expires_at: *expires_at,
            },
            (SeatStatus::Locked { holder, expires_at }, SeatEvent::Commit { holder: by, now })
                if holder == by && *expires_at > *now =>
            {
                SeatStatus::Booked { holder: *holder }
            }
            (
                SeatStatus::Locked { holder, .. } | SeatStatus::Booked { holder },
                SeatEvent::Release { holder: by },
            ) if holder == by => SeatStatus::Available,
            (SeatStatus::Locked { expires_at, .. }, SeatEvent::Expire { now })
                if *expires_at <= *now =>
            {
                SeatStatus::Available
            }
            (SeatStatus::Booked { holder }, SeatEvent::Occupy { holder: by }) if holder == by => {
                SeatStatus::Occupied { holder: *holder }
            }
            (SeatStatus::Available, SeatEvent::StartMaintenance) => SeatStatus::Maintenance,
            (SeatStatus::Maintenance, SeatEvent::EndMaintenance) => SeatStatus::Available,
            _ => return Err(IllegalTransition::new("seat", &self.status, &event)),
        };
        self.status = next;
        Ok(())
    }
}

// ============================================================================
// Lock handle
// ============================================================================

/// Proof of a successful multi-seat lock, owned by the booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHandle {
    /// Showing
    pub showing_id: ShowingId,
    /// Booking holding the seats
    pub holder: BookingId,
    /// Locked seats, ascending
    pub seats: Vec<SeatCode>,
    /// When the hold lapses
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Availability
// ============================================================================

#[derive(Clone, Copy)]
enum Counter {
    Available,
    Locked,
    Booked,
    Occupied,
    Maintenance,
}

/// Seat counts of a showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    /// Showing
    pub showing_id: ShowingId,
    /// All seats
    pub total: u32,
    /// Free seats, including lapsed holds the sweeper has not reclaimed yet
    pub available: u32,
    /// Seats under an unexpired hold
    pub locked: u32,
    /// Sold seats
    pub booked: u32,
    /// Attended seats
    pub occupied: u32,
    /// Out of service
    pub maintenance: u32,
}

struct ShowingSeats {
    seats: BTreeMap<SeatCode, Arc<Mutex<Seat>>>,
    counters: [AtomicU32; 5],
    /// Expiry of every seat currently `Locked`
    holds: DashMap<SeatCode, DateTime<Utc>>,
}

impl ShowingSeats {
    fn count(&self, counter: Counter) -> u32 {
        self.counters[counter as usize].load(Ordering::SeqCst)
    }

    /// Apply `event`, keeping the counters and hold expiries in step with the
    /// seat's state.
    fn transition(
        &self,
        seat: &mut Seat,
        event: SeatEvent,
    ) -> std::result::Result<(), IllegalTransition> {
        let before = seat.status.counter();
        seat.apply(event)?;
        let after = seat.status.counter();
        self.counters[before as usize].fetch_sub(1, Ordering::SeqCst);
        self.counters[after as usize].fetch_add(1, Ordering::SeqCst);
        match seat.status {
            SeatStatus::Locked { expires_at, .. } => {
                self.holds.insert(seat.code.clone(), expires_at);
            }
            _ => {
                self.holds.remove(&seat.code);
            }
        }
        Ok(())
    }

    /// Holds that lapsed at or before `now` and still await the sweeper.
    fn lapsed(&self, now: DateTime<Utc>) -> u32 {
        let lapsed = self.holds.iter().filter(|hold| *hold.value() <= now).count();
        u32::try_from(lapsed).unwrap_or(u32::MAX)
    }

    fn availability(&self, showing_id: ShowingId, now: DateTime<Utc>) -> SeatAvailability {
        let locked = self.count(Counter::Locked);
        let lapsed = self.lapsed(now).min(locked);
        SeatAvailability {
            showing_id,
            total: u32::try_from(self.seats.len()).unwrap_or(u32::MAX),
            available: self.count(Counter::Available) + lapsed,
            locked: locked - lapsed,
            booked: self.count(Counter::Booked),
            occupied: self.count(Counter::Occupied),
            maintenance: self.count(Counter::Maintenance),
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Authoritative seat state for every registered showing.
pub struct SeatLedger {
    clock: Arc<dyn Clock>,
    catalog: Arc<dyn Catalog>,
    wait: Duration,
    showings: DashMap<ShowingId, Arc<ShowingSeats>>,
}

impl std::fmt::Debug for SeatLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatLedger")
            .field("showings", &self.showings.len())
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

type SeatGuards = Vec<(SeatCode, OwnedMutexGuard<Seat>)>;

impl SeatLedger {
    /// Create a ledger; `wait` bounds every seat mutex acquisition.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, catalog: Arc<dyn Catalog>, wait: Duration) -> Self {
        Self {
            clock,
            catalog,
            wait,
            showings: DashMap::new(),
        }
    }

    /// Register the seat map of a showing. All seats start `Available`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AlreadyExists`] if the showing is already registered
    /// - [`BookingError::InvalidRequest`] for an empty or duplicated seat map
    pub fn register_showing(
        &self,
        showing_id: ShowingId,
        seats: &[(SeatCode, SeatClass)],
    ) -> Result<()> {
        if seats.is_empty() {
            return Err(BookingError::InvalidRequest(
                "a showing needs at least one seat".to_string(),
            ));
        }
        let mut map = BTreeMap::new();
        for (code, class) in seats {
            let seat = Seat {
                showing_id,
                code: code.clone(),
                class: *class,
                status: SeatStatus::Available,
            };
            if map.insert(code.clone(), Arc::new(Mutex::new(seat))).is_some() {
                return Err(BookingError::InvalidRequest(format!("seat {code} listed twice")));
            }
        }
        let total = u32::try_from(map.len()).unwrap_or(u32::MAX);
        let entry = ShowingSeats {
            seats: map,
            counters: [
                AtomicU32::new(total),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
            holds: DashMap::new(),
        };

        match self.showings.entry(showing_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BookingError::AlreadyExists {
                entity: "showing",
                id: showing_id.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(entry));
                tracing::info!(%showing_id, seats = total, "Registered showing seat map");
                Ok(())
            }
        }
    }

    fn showing(&self, showing_id: ShowingId) -> Result<Arc<ShowingSeats>> {
        self.showings
            .get(&showing_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BookingError::not_found("showing", showing_id))
    }

    /// Acquire the mutexes of `codes` (sorted, distinct) in ascending order.
    async fn acquire(
        &self,
        showing_id: ShowingId,
        showing: &ShowingSeats,
        codes: &[SeatCode],
    ) -> Result<SeatGuards> {
        let mut guards = Vec::with_capacity(codes.len());
        for code in codes {
            let mutex = showing
                .seats
                .get(code)
                .ok_or_else(|| BookingError::not_found("seat", format!("{showing_id}/{code}")))?;
            let guard = lock_within(mutex, self.wait, TABLE, code).await?;
            guards.push((code.clone(), guard));
        }
        Ok(guards)
    }

    /// Lock every seat in `codes` for `holder` until `now + ttl`.
    ///
    /// All-or-nothing: if any seat is not `Available`, nothing changes.
    ///
    /// # Errors
    ///
    /// - [`BookingError::SeatUnavailable`] listing every seat that is taken
    /// - [`BookingError::NotFound`] for an unknown showing or seat
    /// - [`BookingError::InvalidRequest`] for an empty selection
    /// - [`BookingError::Busy`] if a seat mutex was not granted in time
    pub async fn lock(
        &self,
        showing_id: ShowingId,
        codes: &[SeatCode],
        holder: BookingId,
        ttl: Duration,
    ) -> Result<LockHandle> {
        if codes.is_empty() {
            return Err(BookingError::InvalidRequest("no seats requested".to_string()));
        }
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();

        let showing = self.showing(showing_id)?;
        let mut guards = self.acquire(showing_id, &showing, &sorted).await?;

        let taken: Vec<SeatCode> = guards
            .iter()
            .filter(|(_, seat)| seat.status != SeatStatus::Available)
            .map(|(code, _)| code.clone())
            .collect();
        if !taken.is_empty() {
            record_seat_lock("unavailable");
            tracing::debug!(%showing_id, %holder, seats = ?taken, "Seat lock refused");
            return Err(BookingError::SeatUnavailable {
                showing_id,
                seats: taken,
            });
        }

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| BookingError::InvalidRequest("seat hold ttl out of range".to_string()))?;
        let expires_at = self.clock.now() + ttl;
        for (_, seat) in &mut guards {
            showing.transition(seat, SeatEvent::Lock { holder, expires_at })?;
        }
        drop(guards);

        record_seat_lock("locked");
        tracing::debug!(%showing_id, %holder, seats = ?sorted, %expires_at, "Seats locked");
        self.publish(showing_id, &showing).await;

        Ok(LockHandle {
            showing_id,
            holder,
            seats: sorted,
            expires_at,
        })
    }

    /// Turn the holds in `handle` into sales.
    ///
    /// If any hold has lapsed or been taken over, every seat still held by the
    /// handle's holder is returned to `Available` and the commit fails.
    ///
    /// # Errors
    ///
    /// - [`BookingError::LockExpired`] when the hold is no longer valid
    /// - [`BookingError::Busy`] if a seat mutex was not granted in time
    pub async fn commit(&self, handle: &LockHandle) -> Result<()> {
        let showing = self.showing(handle.showing_id)?;
        let mut guards = self.acquire(handle.showing_id, &showing, &handle.seats).await?;
        let now = self.clock.now();

        let intact = guards.iter().all(|(_, seat)| {
            matches!(seat.status, SeatStatus::Locked { holder, expires_at }
                if holder == handle.holder && expires_at > now)
        });

        if !intact {
            for (_, seat) in &mut guards {
                if seat.status.holder() == Some(handle.holder) {
                    showing.transition(seat, SeatEvent::Release { holder: handle.holder })?;
                }
            }
            drop(guards);
            record_seat_lock("expired");
            tracing::warn!(
                showing_id = %handle.showing_id,
                holder = %handle.holder,
                "Seat lock lapsed before commit"
            );
            self.publish(handle.showing_id, &showing).await;
            return Err(BookingError::LockExpired {
                holder: handle.holder,
            });
        }

        for (_, seat) in &mut guards {
            showing.transition(
                seat,
                SeatEvent::Commit {
                    holder: handle.holder,
                    now,
                },
            )?;
        }
        drop(guards);
        record_seat_lock("committed");
        tracing::debug!(
            showing_id = %handle.showing_id,
            holder = %handle.holder,
            "Seats committed"
        );
        self.publish(handle.showing_id, &showing).await;
        Ok(())
    }

    /// Release the seats of `handle`.
    ///
    /// # Errors
    ///
    /// See [`SeatLedger::release_seats`].
    pub async fn release(&self, handle: &LockHandle) -> Result<usize> {
        self.release_seats(handle.showing_id, &handle.seats, handle.holder).await
    }

    /// Return seats held (locked or booked) by `holder` to `Available`.
    ///
    /// Seats that `holder` no longer holds are left alone, so a stale release
    /// never frees a seat re-locked by someone else. Returns how many seats
    /// were freed.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown showing or seat
    /// - [`BookingError::Busy`] if a seat mutex was not granted in time
    pub async fn release_seats(
        &self,
        showing_id: ShowingId,
        codes: &[SeatCode],
        holder: BookingId,
    ) -> Result<usize> {
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();

        let showing = self.showing(showing_id)?;
        let mut guards = self.acquire(showing_id, &showing, &sorted).await?;
        let mut released = 0;
        for (code, seat) in &mut guards {
            match seat.status {
                SeatStatus::Locked { holder: h, .. } | SeatStatus::Booked { holder: h }
                    if h == holder =>
                {
                    showing.transition(seat, SeatEvent::Release { holder })?;
                    released += 1;
                }
                _ => {
                    tracing::debug!(
                        %showing_id,
                        %holder,
                        seat = %code,
                        "Seat not held by releaser, skipped"
                    );
                }
            }
        }
        drop(guards);

        if released > 0 {
            record_seat_lock("released");
            self.publish(showing_id, &showing).await;
        }
        Ok(released)
    }

    /// Mark booked seats as attended.
    ///
    /// # Errors
    ///
    /// - [`BookingError::IllegalTransition`] if a seat is not booked by `holder`
    /// - [`BookingError::Busy`] if a seat mutex was not granted in time
    pub async fn occupy(
        &self,
        showing_id: ShowingId,
        codes: &[SeatCode],
        holder: BookingId,
    ) -> Result<()> {
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();

        let showing = self.showing(showing_id)?;
        let mut guards = self.acquire(showing_id, &showing, &sorted).await?;
        if let Some((_, seat)) = guards
            .iter()
            .find(|(_, seat)| seat.status != (SeatStatus::Booked { holder }))
        {
            let event = SeatEvent::Occupy { holder };
            return Err(IllegalTransition::new("seat", &seat.status, &event).into());
        }
        for (_, seat) in &mut guards {
            showing.transition(seat, SeatEvent::Occupy { holder })?;
        }
        Ok(())
    }

    /// Reclaim every hold that lapsed at or before now. Returns the number of
    /// seats reclaimed. Seats whose mutex is busy are skipped until the next
    /// sweep.
    pub async fn sweep_expired_locks(&self) -> usize {
        let now = self.clock.now();
        let showings: Vec<(ShowingId, Arc<ShowingSeats>)> = self
            .showings
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        let mut reclaimed = 0;
        for (showing_id, showing) in showings {
            let mut touched = 0;
            for (code, mutex) in &showing.seats {
                let Ok(mut seat) = Arc::clone(mutex).try_lock_owned() else {
                    continue;
                };
                if seat.lock_expired(now) {
                    match showing.transition(&mut seat, SeatEvent::Expire { now }) {
                        Ok(()) => touched += 1,
                        Err(err) => {
                            tracing::error!(
                                %showing_id,
                                seat = %code,
                                error = %err,
                                "Expire rejected"
                            );
                        }
                    }
                }
            }
            if touched > 0 {
                tracing::info!(%showing_id, seats = touched, "Reclaimed lapsed seat locks");
                self.publish(showing_id, &showing).await;
                reclaimed += touched;
            }
        }
        if reclaimed > 0 {
            crate::metrics::record_seat_locks_swept(reclaimed);
        }
        reclaimed
    }

    /// Take an available seat out of service.
    ///
    /// # Errors
    ///
    /// [`BookingError::IllegalTransition`] unless the seat is `Available`.
    pub async fn set_maintenance(&self, showing_id: ShowingId, code: &SeatCode) -> Result<()> {
        self.single(showing_id, code, SeatEvent::StartMaintenance).await
    }

    /// Return a seat to service.
    ///
    /// # Errors
    ///
    /// [`BookingError::IllegalTransition`] unless the seat is under maintenance.
    pub async fn clear_maintenance(&self, showing_id: ShowingId, code: &SeatCode) -> Result<()> {
        self.single(showing_id, code, SeatEvent::EndMaintenance).await
    }

    async fn single(&self, showing_id: ShowingId, code: &SeatCode, event: SeatEvent) -> Result<()> {
        let showing = self.showing(showing_id)?;
        let mut guards = self.acquire(showing_id, &showing, std::slice::from_ref(code)).await?;
        for (_, seat) in &mut guards {
            showing.transition(seat, event.clone())?;
        }
        drop(guards);
        self.publish(showing_id, &showing).await;
        Ok(())
    }

    /// Snapshot of one seat.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown showing or seat, or
    /// [`BookingError::Busy`] if the seat mutex was not granted in time.
    pub async fn seat(&self, showing_id: ShowingId, code: &SeatCode) -> Result<Seat> {
        let showing = self.showing(showing_id)?;
        let guards = self.acquire(showing_id, &showing, std::slice::from_ref(code)).await?;
        guards
            .first()
            .map(|(_, seat)| (**seat).clone())
            .ok_or_else(|| BookingError::not_found("seat", code))
    }

    /// Current seat counts of a showing. Lapsed holds count as available
    /// even before the sweeper reclaims them.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown showing.
    pub fn availability(&self, showing_id: ShowingId) -> Result<SeatAvailability> {
        Ok(self.showing(showing_id)?.availability(showing_id, self.clock.now()))
    }

    async fn publish(&self, showing_id: ShowingId, showing: &ShowingSeats) {
        let available = showing.availability(showing_id, self.clock.now()).available;
        if let Err(err) = self.catalog.record_availability(showing_id, available).await {
            tracing::warn!(
                %showing_id,
                available,
                error = %err,
                "Could not report availability to catalog"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::collaborators::InMemoryCatalog;
    use crate::types::{Money, Showing, ShowingStatus};
    use boxoffice_testing::{ManualClock, utc};

    const TTL: Duration = Duration::from_secs(600);

    struct Fixture {
        clock: Arc<ManualClock>,
        catalog: Arc<InMemoryCatalog>,
        ledger: SeatLedger,
        showing_id: ShowingId,
    }

    fn code(raw: &str) -> SeatCode {
        SeatCode::parse(raw).unwrap()
    }

    fn codes(raw: &[&str]) -> Vec<SeatCode> {
        raw.iter().map(|c| code(c)).collect()
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(utc(2025, 1, 6, 10, 0)));
        let catalog = Arc::new(InMemoryCatalog::new());
        let showing_id = ShowingId::new();
        let seats: Vec<(SeatCode, SeatClass)> = ["A1", "A2", "A3", "B1"]
            .iter()
            .map(|c| (code(c), SeatClass::Regular))
            .collect();
        catalog
            .add_showing(
                Showing {
                    id: showing_id,
                    title: "Test".to_string(),
                    starts_at: utc(2025, 1, 6, 14, 0),
                    base_price: Money::from_units(100),
                    total_seats: 4,
                    available_seats: 4,
                    sale_opens_at: utc(2025, 1, 1, 0, 0),
                    last_bookable_at: utc(2025, 1, 6, 13, 45),
                    status: ShowingStatus::OnSale,
                },
                &seats,
            )
            .unwrap();
        let ledger = SeatLedger::new(clock.clone(), catalog.clone(), Duration::from_millis(200));
        ledger.register_showing(showing_id, &seats).unwrap();
        Fixture {
            clock,
            catalog,
            ledger,
            showing_id,
        }
    }

    #[test]
    fn seat_transitions() {
        let holder = BookingId::new();
        let other = BookingId::new();
        let now = utc(2025, 1, 6, 10, 0);
        let mut seat = Seat {
            showing_id: ShowingId::new(),
            code: code("A1"),
            class: SeatClass::Vip,
            status: SeatStatus::Available,
        };
        let expires_at = now + chrono::Duration::minutes(10);

        seat.apply(SeatEvent::Lock { holder, expires_at }).unwrap();
        assert!(seat.apply(SeatEvent::Lock { holder: other, expires_at }).is_err());
        assert!(seat.apply(SeatEvent::Commit { holder: other, now }).is_err());
        assert!(seat.apply(SeatEvent::Expire { now }).is_err());
        seat.apply(SeatEvent::Commit { holder, now }).unwrap();
        assert_eq!(seat.status, SeatStatus::Booked { holder });
        seat.apply(SeatEvent::Occupy { holder }).unwrap();
        assert!(seat.apply(SeatEvent::Release { holder }).is_err());
    }

    #[test]
    fn commit_after_expiry_is_illegal() {
        let holder = BookingId::new();
        let now = utc(2025, 1, 6, 10, 0);
        let mut seat = Seat {
            showing_id: ShowingId::new(),
            code: code("A1"),
            class: SeatClass::Regular,
            status: SeatStatus::Locked {
                holder,
                expires_at: now,
            },
        };
        assert!(seat.apply(SeatEvent::Commit { holder, now }).is_err());
        seat.apply(SeatEvent::Expire { now }).unwrap();
        assert_eq!(seat.status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn lock_commit_and_availability() {
        let f = fixture();
        let holder = BookingId::new();
        let handle = f.ledger.lock(f.showing_id, &codes(&["A2", "A1"]), holder, TTL).await.unwrap();
        assert_eq!(handle.seats, codes(&["A1", "A2"]));
        assert_eq!(handle.expires_at, utc(2025, 1, 6, 10, 10));

        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.locked), (2, 2));

        f.ledger.commit(&handle).await.unwrap();
        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.locked, counts.booked), (2, 0, 2));
        assert_eq!(
            f.ledger.seat(f.showing_id, &code("A1")).await.unwrap().status,
            SeatStatus::Booked { holder }
        );
        assert_eq!(f.catalog.get_showing(f.showing_id).await.unwrap().available_seats, 2);
    }

    #[tokio::test]
    async fn lock_is_all_or_nothing() {
        let f = fixture();
        f.ledger.lock(f.showing_id, &codes(&["A2"]), BookingId::new(), TTL).await.unwrap();

        let err = f
            .ledger
            .lock(f.showing_id, &codes(&["A1", "A2", "A3"]), BookingId::new(), TTL)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::SeatUnavailable {
                showing_id: f.showing_id,
                seats: codes(&["A2"]),
            }
        );
        for untouched in ["A1", "A3"] {
            let seat = f.ledger.seat(f.showing_id, &code(untouched)).await.unwrap();
            assert_eq!(seat.status, SeatStatus::Available);
        }
    }

    #[tokio::test]
    async fn unknown_seat_is_not_found() {
        let f = fixture();
        let err = f
            .ledger
            .lock(f.showing_id, &codes(&["Z9"]), BookingId::new(), TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { entity: "seat", .. }));
    }

    #[tokio::test]
    async fn expired_lock_cannot_commit_and_is_reverted() {
        let f = fixture();
        let holder = BookingId::new();
        let handle = f.ledger.lock(f.showing_id, &codes(&["A1", "A2"]), holder, TTL).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(11));

        let err = f.ledger.commit(&handle).await.unwrap_err();
        assert_eq!(err, BookingError::LockExpired { holder });
        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.locked, counts.booked), (4, 0, 0));
    }

    #[tokio::test]
    async fn lapsed_hold_counts_as_available_before_sweep() {
        let f = fixture();
        let holder = BookingId::new();
        f.ledger.lock(f.showing_id, &codes(&["A1"]), holder, TTL).await.unwrap();
        f.ledger.lock(f.showing_id, &codes(&["B1"]), BookingId::new(), TTL).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(5));
        f.ledger.lock(f.showing_id, &codes(&["A2"]), BookingId::new(), TTL).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(6));

        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.locked), (3, 1));

        // The seat itself stays held until the sweeper runs.
        let err = f
            .ledger
            .lock(f.showing_id, &codes(&["A1"]), BookingId::new(), TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable { .. }));

        // Any later publish reports the same figure to the catalog.
        f.ledger.set_maintenance(f.showing_id, &code("A3")).await.unwrap();
        assert_eq!(f.catalog.get_showing(f.showing_id).await.unwrap().available_seats, 2);

        assert_eq!(f.ledger.sweep_expired_locks().await, 2);
        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.locked, counts.maintenance), (2, 1, 1));
    }

    #[tokio::test]
    async fn sweep_reclaims_only_lapsed_locks() {
        let f = fixture();
        let stale = f
            .ledger
            .lock(f.showing_id, &codes(&["A1"]), BookingId::new(), TTL)
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::minutes(5));
        let fresh = f
            .ledger
            .lock(f.showing_id, &codes(&["B1"]), BookingId::new(), TTL)
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::minutes(6));

        assert_eq!(f.ledger.sweep_expired_locks().await, 1);
        assert_eq!(
            f.ledger.seat(f.showing_id, &stale.seats[0]).await.unwrap().status,
            SeatStatus::Available
        );
        assert!(matches!(
            f.ledger.seat(f.showing_id, &fresh.seats[0]).await.unwrap().status,
            SeatStatus::Locked { .. }
        ));
        assert_eq!(f.ledger.sweep_expired_locks().await, 0);
    }

    #[tokio::test]
    async fn stale_release_does_not_free_another_holders_seat() {
        let f = fixture();
        let first = BookingId::new();
        let handle = f.ledger.lock(f.showing_id, &codes(&["A1"]), first, TTL).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(11));
        f.ledger.sweep_expired_locks().await;

        let second = BookingId::new();
        f.ledger.lock(f.showing_id, &codes(&["A1"]), second, TTL).await.unwrap();

        assert_eq!(f.ledger.release(&handle).await.unwrap(), 0);
        assert!(matches!(
            f.ledger.seat(f.showing_id, &code("A1")).await.unwrap().status,
            SeatStatus::Locked { holder, .. } if holder == second
        ));
    }

    #[tokio::test]
    async fn booked_seats_can_be_released_and_occupied() {
        let f = fixture();
        let holder = BookingId::new();
        let handle = f.ledger.lock(f.showing_id, &codes(&["A1", "A2"]), holder, TTL).await.unwrap();
        f.ledger.commit(&handle).await.unwrap();

        f.ledger.occupy(f.showing_id, &codes(&["A1"]), holder).await.unwrap();
        assert!(f.ledger.occupy(f.showing_id, &codes(&["A3"]), holder).await.is_err());

        // A1 is occupied and stays; A2 goes back on sale.
        assert_eq!(f.ledger.release(&handle).await.unwrap(), 1);
        let counts = f.ledger.availability(f.showing_id).unwrap();
        assert_eq!((counts.available, counts.occupied), (3, 1));
    }

    #[tokio::test]
    async fn maintenance_blocks_locking() {
        let f = fixture();
        f.ledger.set_maintenance(f.showing_id, &code("A3")).await.unwrap();
        let err = f
            .ledger
            .lock(f.showing_id, &codes(&["A3"]), BookingId::new(), TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable { .. }));
        f.ledger.clear_maintenance(f.showing_id, &code("A3")).await.unwrap();
        assert!(f.ledger.lock(f.showing_id, &codes(&["A3"]), BookingId::new(), TTL).await.is_ok());
    }

    #[tokio::test]
    async fn full_house_flips_catalog_status() {
        let f = fixture();
        let holder = BookingId::new();
        let handle = f
            .ledger
            .lock(f.showing_id, &codes(&["A1", "A2", "A3", "B1"]), holder, TTL)
            .await
            .unwrap();
        assert_eq!(f.catalog.get_showing(f.showing_id).await.unwrap().status, ShowingStatus::Full);
        f.ledger.release(&handle).await.unwrap();
        let listed = f.catalog.get_showing(f.showing_id).await.unwrap();
        assert_eq!(listed.status, ShowingStatus::OnSale);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let f = fixture();
        let err = f
            .ledger
            .register_showing(f.showing_id, &[(code("A1"), SeatClass::Regular)])
            .unwrap_err();
        assert!(matches!(err, BookingError::AlreadyExists { .. }));
    }
}
