//! Boxoffice - the transactional core of a cinema ticket-booking service.
//!
//! A member picks seats for a showing, optionally redeems a discount code and
//! pays from a stored-value wallet. Five components cooperate:
//!
//! - [`SeatLedger`]: per-seat state machine with time-boxed locks
//! - [`PricingEngine`]: seat class multipliers and weekend/peak surcharge
//! - [`DiscountEngine`]: validity checks and an optimistic usage counter
//! - [`WalletLedger`]: balances, daily/monthly limits and ledger entries
//! - [`BookingOrchestrator`]: runs the booking flow and its compensations
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!   HTTP (axum) ──→│ BookingOrchestrator  │
//!                  └──────────────────────┘
//!        │            │            │             │
//!        ▼            ▼            ▼             ▼
//!  ┌───────────┐ ┌─────────┐ ┌───────────┐ ┌────────────┐
//!  │SeatLedger │ │ Pricing │ │ Discounts │ │WalletLedger│
//!  └───────────┘ └─────────┘ └───────────┘ └────────────┘
//!        │                                       │
//!        ▼                                       ▼
//!    Catalog (showings, seat classes)     MemberDirectory
//! ```
//!
//! # Concurrency
//!
//! Seats, wallets and bookings each sit behind their own async mutex. Locks
//! are taken booking first, then seats in ascending code order or the wallet,
//! never seats and wallet together. Every wait is bounded; a timeout surfaces
//! as the retryable [`BookingError::Busy`].
//!
//! # Booking Flow
//!
//! ```text
//! validate → lock seats → price → redeem discount → debit wallet → commit seats → confirm
//!                 ↑           ↑            ↑               ↑              │
//!                 └───────────┴────────────┴───────────────┴── compensate ┘ (on failure)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod app;
pub mod booking;
pub mod collaborators;
pub mod config;
pub mod discount;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod orchestrator;
pub mod pricing;
pub mod seats;
pub mod server;
pub mod types;
pub mod wallet;

pub use app::BoxofficeApp;
pub use booking::{
    Booking, BookingResponse, BookingStatus, CancelBookingRequest, CreateBookingRequest,
    PaymentStatus,
};
pub use collaborators::{Catalog, InMemoryCatalog, InMemoryMembers, MemberDirectory};
pub use config::Config;
pub use discount::{DiscountCode, DiscountEngine, DiscountKind, Redemption};
pub use error::{BookingError, Result};
pub use orchestrator::{BookingEnvironment, BookingOrchestrator, BookingSettings};
pub use pricing::PricingEngine;
pub use seats::{LockHandle, SeatAvailability, SeatLedger, SeatStatus};
pub use types::*;
pub use wallet::{LedgerEntry, Wallet, WalletLedger, WalletLimits, WalletStatus};
