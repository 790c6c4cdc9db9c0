//! Application coordinator - wires together all components.
//!
//! `BoxofficeApp` owns one instance of every ledger plus the in-memory
//! collaborators, and hands out the orchestrator the HTTP layer talks to.

use crate::collaborators::{InMemoryCatalog, InMemoryMembers};
use crate::config::Config;
use crate::discount::{DiscountCode, DiscountEngine, DiscountKind};
use crate::error::Result;
use crate::maintenance::{Maintenance, MaintenanceSchedule};
use crate::orchestrator::{BookingEnvironment, BookingOrchestrator, BookingSettings};
use crate::pricing::PricingEngine;
use crate::seats::SeatLedger;
use crate::types::{MemberId, Money, SeatClass, SeatCode, Showing, ShowingId, ShowingStatus};
use crate::wallet::{Wallet, WalletLedger, WalletLimits};
use boxoffice_core::environment::Clock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Ids created by [`BoxofficeApp::seed_demo`].
#[derive(Debug, Clone)]
pub struct DemoSeed {
    /// Demo showing
    pub showing_id: ShowingId,
    /// Demo member
    pub member_id: MemberId,
    /// The member's wallet
    pub wallet: Wallet,
    /// Demo discount code
    pub discount_code: String,
}

/// The booking application.
pub struct BoxofficeApp {
    config: Config,
    clock: Arc<dyn Clock>,
    catalog: Arc<InMemoryCatalog>,
    members: Arc<InMemoryMembers>,
    seats: Arc<SeatLedger>,
    discounts: Arc<DiscountEngine>,
    wallets: Arc<WalletLedger>,
    orchestrator: Arc<BookingOrchestrator>,
}

impl BoxofficeApp {
    /// Build every component from configuration.
    #[must_use]
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        let wait = config.booking.lock_wait();
        let catalog = Arc::new(InMemoryCatalog::new());
        let members = Arc::new(InMemoryMembers::new());
        let seats = Arc::new(SeatLedger::new(clock.clone(), catalog.clone(), wait));
        let discounts = Arc::new(DiscountEngine::new(
            clock.clone(),
            wait,
            config.booking.discount_cas_retries,
        ));
        let wallets = Arc::new(WalletLedger::new(clock.clone(), wait));

        let orchestrator = Arc::new(BookingOrchestrator::new(
            BookingEnvironment {
                clock: clock.clone(),
                catalog: catalog.clone(),
                members: members.clone(),
                seats: seats.clone(),
                discounts: discounts.clone(),
                wallets: wallets.clone(),
                pricing: PricingEngine::new(config.booking.venue_offset()),
            },
            BookingSettings::from_config(&config),
        ));

        tracing::debug!(
            seat_hold_ttl = config.booking.seat_hold_ttl,
            pending_timeout = config.booking.pending_timeout,
            lock_wait_ms = config.booking.lock_wait_ms,
            "Booking components initialized"
        );

        Self {
            config,
            clock,
            catalog,
            members,
            seats,
            discounts,
            wallets,
            orchestrator,
        }
    }

    /// Configuration the app was built with
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Booking orchestrator
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<BookingOrchestrator> {
        &self.orchestrator
    }

    /// Seat ledger
    #[must_use]
    pub const fn seats(&self) -> &Arc<SeatLedger> {
        &self.seats
    }

    /// Wallet ledger
    #[must_use]
    pub const fn wallets(&self) -> &Arc<WalletLedger> {
        &self.wallets
    }

    /// Discount engine
    #[must_use]
    pub const fn discounts(&self) -> &Arc<DiscountEngine> {
        &self.discounts
    }

    /// Showing catalog
    #[must_use]
    pub const fn catalog(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    /// Member directory
    #[must_use]
    pub const fn members(&self) -> &Arc<InMemoryMembers> {
        &self.members
    }

    /// Put a showing on the catalog and register its seats.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::AlreadyExists`] for a known showing id.
    pub fn open_showing(&self, showing: Showing, seats: &[(SeatCode, SeatClass)]) -> Result<()> {
        let showing_id = showing.id;
        let title = showing.title.clone();
        self.catalog.add_showing(showing, seats)?;
        self.seats.register_showing(showing_id, seats)?;
        tracing::info!(%showing_id, %title, seats = seats.len(), "Showing opened");
        Ok(())
    }

    /// Enroll a member with a fresh wallet.
    ///
    /// # Errors
    ///
    /// Propagates wallet creation errors.
    pub fn enroll_member(
        &self,
        member_id: MemberId,
        limits: WalletLimits,
        initial_balance: Money,
    ) -> Result<Wallet> {
        let wallet = self.wallets.open_wallet(member_id, limits, initial_balance)?;
        self.members.enroll(member_id, wallet.id);
        tracing::info!(
            %member_id,
            wallet_id = %wallet.id,
            balance = %wallet.balance,
            "Member enrolled"
        );
        Ok(wallet)
    }

    /// Seed one showing, one member and one discount code for local use.
    ///
    /// The showing starts a week from now with rows A (VIP), B-C (regular)
    /// and D (couple), eight seats each.
    ///
    /// # Errors
    ///
    /// Propagates registration errors.
    pub fn seed_demo(&self) -> Result<DemoSeed> {
        let now = self.clock.now();
        let mut seats = Vec::new();
        for (row, class) in [
            ('A', SeatClass::Vip),
            ('B', SeatClass::Regular),
            ('C', SeatClass::Regular),
            ('D', SeatClass::Couple),
        ] {
            for number in 1..=8 {
                seats.push((SeatCode::parse(&format!("{row}{number}"))?, class));
            }
        }

        let starts_at = now + chrono::Duration::days(7);
        let showing = Showing {
            id: ShowingId::new(),
            title: "Demo Feature - Room 1".to_string(),
            starts_at,
            base_price: Money::from_units(200),
            total_seats: u32::try_from(seats.len()).unwrap_or(u32::MAX),
            available_seats: u32::try_from(seats.len()).unwrap_or(u32::MAX),
            sale_opens_at: now,
            last_bookable_at: starts_at - chrono::Duration::minutes(15),
            status: ShowingStatus::OnSale,
        };
        let showing_id = showing.id;
        self.open_showing(showing, &seats)?;

        let member_id = MemberId::new();
        let wallet =
            self.enroll_member(member_id, WalletLimits::default(), Money::from_units(1_000))?;

        let discount_code = "WELCOME10".to_string();
        self.discounts.register(DiscountCode {
            code: discount_code.clone(),
            kind: DiscountKind::Percentage,
            value: 10,
            min_purchase: Money::ZERO,
            max_discount: Some(Money::from_units(100)),
            valid_from: now,
            valid_until: now + chrono::Duration::days(30),
            per_member_limit: 1,
            usage_limit: 100,
            active: true,
        })?;

        tracing::info!(
            %showing_id,
            %member_id,
            wallet_id = %wallet.id,
            discount = %discount_code,
            "Demo data seeded"
        );
        Ok(DemoSeed {
            showing_id,
            member_id,
            wallet,
            discount_code,
        })
    }

    /// Start the background sweep, expiry and rollover loops.
    #[must_use]
    pub fn spawn_maintenance(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        Maintenance {
            clock: self.clock.clone(),
            seats: self.seats.clone(),
            wallets: self.wallets.clone(),
            orchestrator: self.orchestrator.clone(),
            venue_offset: self.config.booking.venue_offset(),
            schedule: MaintenanceSchedule::from(&self.config.maintenance),
        }
        .spawn(shutdown)
    }
}
