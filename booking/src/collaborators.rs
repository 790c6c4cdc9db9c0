//! Interfaces to systems the booking core consumes but does not own.
//!
//! The catalog owns showings and seat classes; the member directory owns
//! members and knows which wallet belongs to whom. Both are async traits so a
//! deployment can back them with remote services. The in-memory versions here
//! serve the bundled server and the tests.

use crate::error::{BookingError, Result};
use crate::types::{MemberId, SeatClass, SeatCode, Showing, ShowingId, ShowingStatus, WalletId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Read access to showings plus the availability write-back.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a showing snapshot.
    async fn get_showing(&self, showing_id: ShowingId) -> Result<Showing>;

    /// Look up the class of one seat.
    async fn get_seat_class(&self, showing_id: ShowingId, code: &SeatCode) -> Result<SeatClass>;

    /// Store the latest available-seat count. The catalog flips the showing
    /// between `OnSale` and `Full` when the count reaches or leaves zero.
    async fn record_availability(&self, showing_id: ShowingId, available: u32) -> Result<()>;
}

/// Member lookups.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// The wallet that pays for this member's bookings.
    async fn get_wallet_id(&self, member_id: MemberId) -> Result<WalletId>;

    /// Whether the member may place bookings.
    async fn is_member_active(&self, member_id: MemberId) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    showing: Showing,
    seat_classes: HashMap<SeatCode, SeatClass>,
}

/// Catalog kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    showings: DashMap<ShowingId, CatalogEntry>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a showing with its seat map.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::AlreadyExists`] if the id is taken.
    pub fn add_showing(&self, showing: Showing, seats: &[(SeatCode, SeatClass)]) -> Result<()> {
        if self.showings.contains_key(&showing.id) {
            return Err(BookingError::AlreadyExists {
                entity: "showing",
                id: showing.id.to_string(),
            });
        }
        let seat_classes = seats.iter().cloned().collect();
        self.showings.insert(
            showing.id,
            CatalogEntry {
                showing,
                seat_classes,
            },
        );
        Ok(())
    }

    /// Change a showing's lifecycle status (e.g. when it ends).
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown showing.
    pub fn set_status(&self, showing_id: ShowingId, status: ShowingStatus) -> Result<()> {
        let mut entry = self
            .showings
            .get_mut(&showing_id)
            .ok_or_else(|| BookingError::not_found("showing", showing_id))?;
        entry.showing.status = status;
        Ok(())
    }

    /// All showings, in no particular order.
    #[must_use]
    pub fn showings(&self) -> Vec<Showing> {
        self.showings.iter().map(|e| e.showing.clone()).collect()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_showing(&self, showing_id: ShowingId) -> Result<Showing> {
        self.showings
            .get(&showing_id)
            .map(|e| e.showing.clone())
            .ok_or_else(|| BookingError::not_found("showing", showing_id))
    }

    async fn get_seat_class(&self, showing_id: ShowingId, code: &SeatCode) -> Result<SeatClass> {
        let entry = self
            .showings
            .get(&showing_id)
            .ok_or_else(|| BookingError::not_found("showing", showing_id))?;
        entry
            .seat_classes
            .get(code)
            .copied()
            .ok_or_else(|| BookingError::not_found("seat", format!("{showing_id}/{code}")))
    }

    async fn record_availability(&self, showing_id: ShowingId, available: u32) -> Result<()> {
        let mut entry = self
            .showings
            .get_mut(&showing_id)
            .ok_or_else(|| BookingError::not_found("showing", showing_id))?;
        let showing = &mut entry.showing;
        showing.available_seats = available;
        showing.status = match (showing.status, available) {
            (ShowingStatus::OnSale, 0) => ShowingStatus::Full,
            (ShowingStatus::Full, n) if n > 0 => ShowingStatus::OnSale,
            (status, _) => status,
        };
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct MemberRecord {
    wallet_id: WalletId,
    active: bool,
}

/// Member directory kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMembers {
    members: DashMap<MemberId, MemberRecord>,
}

impl InMemoryMembers {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active member paying with `wallet_id`.
    pub fn enroll(&self, member_id: MemberId, wallet_id: WalletId) {
        self.members.insert(
            member_id,
            MemberRecord {
                wallet_id,
                active: true,
            },
        );
    }

    /// Activate or deactivate a member.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown member.
    pub fn set_active(&self, member_id: MemberId, active: bool) -> Result<()> {
        let mut record = self
            .members
            .get_mut(&member_id)
            .ok_or_else(|| BookingError::not_found("member", member_id))?;
        record.active = active;
        Ok(())
    }
}

#[async_trait]
impl MemberDirectory for InMemoryMembers {
    async fn get_wallet_id(&self, member_id: MemberId) -> Result<WalletId> {
        self.members
            .get(&member_id)
            .map(|r| r.wallet_id)
            .ok_or_else(|| BookingError::not_found("member", member_id))
    }

    async fn is_member_active(&self, member_id: MemberId) -> Result<bool> {
        Ok(self.members.get(&member_id).is_some_and(|r| r.active))
    }
}
