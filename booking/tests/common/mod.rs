//! Shared harness for booking integration tests.
//!
//! Time is frozen at Monday 2025-01-06 10:00 UTC and only moves when a test
//! advances the [`ManualClock`]. Showings start at 14:00 the same day, outside
//! the weekend/peak surcharge window, so seat prices are base x class.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use boxoffice::discount::{DiscountCode, DiscountKind};
use boxoffice::{
    BoxofficeApp, Config, CreateBookingRequest, MemberId, Money, SeatClass, SeatCode, Showing,
    ShowingId, ShowingStatus, WalletId, WalletLimits,
};
use boxoffice_testing::{ManualClock, init_test_tracing, utc};
use std::sync::Arc;

/// Config with quick compensation retries and short lock waits.
pub fn test_config() -> Config {
    Config::from_lookup(|key| {
        match key {
            "BOXOFFICE_LOCK_WAIT_MS" => Some("250"),
            "BOXOFFICE_COMPENSATION_MAX_RETRIES" => Some("2"),
            "BOXOFFICE_COMPENSATION_INITIAL_DELAY_MS" => Some("1"),
            "BOXOFFICE_COMPENSATION_MAX_DELAY_MS" => Some("5"),
            _ => None,
        }
        .map(str::to_string)
    })
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub app: Arc<BoxofficeApp>,
}

impl Harness {
    pub fn new() -> Self {
        init_test_tracing();
        let clock = Arc::new(ManualClock::new(utc(2025, 1, 6, 10, 0)));
        let app = Arc::new(BoxofficeApp::new(test_config(), clock.clone()));
        Self { clock, app }
    }

    /// Open a showing at 14:00 today; sales close at 13:45.
    pub fn showing(&self, seats: &[(&str, SeatClass)], base_units: u64) -> ShowingId {
        let seats: Vec<(SeatCode, SeatClass)> = seats
            .iter()
            .map(|(code, class)| (SeatCode::parse(code).unwrap(), *class))
            .collect();
        let total = u32::try_from(seats.len()).unwrap();
        let showing = Showing {
            id: ShowingId::new(),
            title: "Integration Feature - Room 2".to_string(),
            starts_at: utc(2025, 1, 6, 14, 0),
            base_price: Money::from_units(base_units),
            total_seats: total,
            available_seats: total,
            sale_opens_at: utc(2025, 1, 1, 0, 0),
            last_bookable_at: utc(2025, 1, 6, 13, 45),
            status: ShowingStatus::OnSale,
        };
        let id = showing.id;
        self.app.open_showing(showing, &seats).unwrap();
        id
    }

    /// A showing with `count` regular seats `A1..A{count}`.
    pub fn regular_showing(&self, count: usize, base_units: u64) -> ShowingId {
        let codes: Vec<String> = (1..=count).map(|n| format!("A{n}")).collect();
        let seats: Vec<(&str, SeatClass)> = codes
            .iter()
            .map(|c| (c.as_str(), SeatClass::Regular))
            .collect();
        self.showing(&seats, base_units)
    }

    pub fn member(&self, balance_units: u64) -> (MemberId, WalletId) {
        self.member_with_limits(balance_units, WalletLimits::default())
    }

    pub fn member_with_limits(
        &self,
        balance_units: u64,
        limits: WalletLimits,
    ) -> (MemberId, WalletId) {
        let member = MemberId::new();
        let wallet = self
            .app
            .enroll_member(member, limits, Money::from_units(balance_units))
            .unwrap();
        (member, wallet.id)
    }

    /// Register a code valid all of January 2025.
    pub fn discount(&self, code: &str, kind: DiscountKind, value: u64, usage_limit: u32) {
        self.app
            .discounts()
            .register(DiscountCode {
                code: code.to_string(),
                kind,
                value,
                min_purchase: Money::ZERO,
                max_discount: None,
                valid_from: utc(2025, 1, 1, 0, 0),
                valid_until: utc(2025, 2, 1, 0, 0),
                per_member_limit: 1,
                usage_limit,
                active: true,
            })
            .unwrap();
    }

    pub async fn balance(&self, wallet: WalletId) -> Money {
        self.app.wallets().wallet(wallet).await.unwrap().balance
    }
}

pub fn request(member: MemberId, showing: ShowingId, seats: &[&str]) -> CreateBookingRequest {
    CreateBookingRequest {
        member_id: member,
        showing_id: showing,
        seat_codes: seats.iter().map(ToString::to_string).collect(),
        discount_code: None,
        special_requests: None,
    }
}

pub fn with_discount(mut request: CreateBookingRequest, code: &str) -> CreateBookingRequest {
    request.discount_code = Some(code.to_string());
    request
}
