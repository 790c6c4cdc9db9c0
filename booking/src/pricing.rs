//! Seat pricing.
//!
//! `price = round_half_up(base × class multiplier × surcharge)` where the
//! surcharge is 1.2 on weekends and during evening peak hours in the venue's
//! local time, 1.0 otherwise. Multipliers are kept in basis points so the whole
//! calculation stays in integer cents and rounds exactly once.

use crate::types::{Money, SeatClass, SeatCode, Showing};
use boxoffice_core::money::BASIS_POINTS;
use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Weekend / peak-hour surcharge (×1.2).
pub const SURCHARGE_BPS: u64 = 12_000;

/// First peak hour (inclusive), venue local time.
pub const PEAK_START_HOUR: u32 = 18;

/// End of peak hours (exclusive), venue local time.
pub const PEAK_END_HOUR: u32 = 22;

impl SeatClass {
    /// Price multiplier in basis points.
    #[must_use]
    pub const fn multiplier_bps(self) -> u64 {
        match self {
            Self::Regular => 10_000,
            Self::Vip => 15_000,
            Self::Couple => 13_000,
            Self::Handicap => 8_000,
            Self::Premium => 20_000,
            Self::Student => 7_000,
        }
    }
}

/// One priced seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLine {
    /// Seat
    pub seat: SeatCode,
    /// Its class
    pub class: SeatClass,
    /// Final seat price
    pub price: Money,
}

/// Priced seat selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Per-seat prices, in the order the seats were quoted. Bookings quote
    /// their locked seats, so ascending seat code.
    pub lines: Vec<PriceLine>,
    /// Whether the surcharge applied
    pub surcharged: bool,
    /// Sum of line prices
    pub subtotal: Money,
}

/// Deterministic pricing function.
#[derive(Clone, Copy, Debug)]
pub struct PricingEngine {
    venue_offset: FixedOffset,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl PricingEngine {
    /// Create an engine that evaluates weekend/peak rules in `venue_offset`.
    #[must_use]
    pub const fn new(venue_offset: FixedOffset) -> Self {
        Self { venue_offset }
    }

    /// The venue offset used for calendar rules
    #[must_use]
    pub const fn venue_offset(&self) -> FixedOffset {
        self.venue_offset
    }

    /// Whether a screening starting at `starts_at` carries the surcharge.
    #[must_use]
    pub fn is_surcharged(&self, starts_at: DateTime<Utc>) -> bool {
        let local = starts_at.with_timezone(&self.venue_offset);
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let peak = (PEAK_START_HOUR..PEAK_END_HOUR).contains(&local.hour());
        weekend || peak
    }

    /// Price one seat.
    ///
    /// The product is computed in 128-bit integers and rounded half-up once;
    /// results beyond `u64` cents saturate.
    #[must_use]
    pub fn seat_price(&self, base: Money, class: SeatClass, starts_at: DateTime<Utc>) -> Money {
        let surcharge = if self.is_surcharged(starts_at) {
            SURCHARGE_BPS
        } else {
            BASIS_POINTS
        };
        let scale = u128::from(BASIS_POINTS) * u128::from(BASIS_POINTS);
        let numerator = u128::from(base.cents())
            * u128::from(class.multiplier_bps())
            * u128::from(surcharge);
        let rounded = (numerator + scale / 2) / scale;
        Money::from_cents(u64::try_from(rounded).unwrap_or(u64::MAX))
    }

    /// Price a seat selection for `showing`.
    #[must_use]
    pub fn quote(&self, showing: &Showing, seats: &[(SeatCode, SeatClass)]) -> PriceQuote {
        let lines: Vec<PriceLine> = seats
            .iter()
            .map(|(seat, class)| PriceLine {
                seat: seat.clone(),
                class: *class,
                price: self.seat_price(showing.base_price, *class, showing.starts_at),
            })
            .collect();
        let subtotal = lines.iter().map(|l| l.price).sum();
        PriceQuote {
            lines,
            surcharged: self.is_surcharged(showing.starts_at),
            subtotal,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{ShowingId, ShowingStatus};
    use boxoffice_testing::utc;
    use proptest::prelude::*;

    const MONDAY_MORNING: (i32, u32, u32, u32, u32) = (2025, 1, 6, 10, 0);

    fn at(t: (i32, u32, u32, u32, u32)) -> DateTime<Utc> {
        utc(t.0, t.1, t.2, t.3, t.4)
    }

    #[test]
    fn vip_on_a_weekday_morning() {
        let engine = PricingEngine::default();
        let price = engine.seat_price(Money::from_units(200), SeatClass::Vip, at(MONDAY_MORNING));
        assert_eq!(price, Money::from_units(300));
    }

    #[test]
    fn weekend_and_peak_hours_are_surcharged() {
        let engine = PricingEngine::default();
        assert!(engine.is_surcharged(utc(2025, 1, 4, 10, 0))); // Saturday
        assert!(engine.is_surcharged(utc(2025, 1, 5, 10, 0))); // Sunday
        assert!(engine.is_surcharged(utc(2025, 1, 6, 18, 0)));
        assert!(engine.is_surcharged(utc(2025, 1, 6, 21, 59)));
        assert!(!engine.is_surcharged(utc(2025, 1, 6, 22, 0)));
        assert!(!engine.is_surcharged(utc(2025, 1, 6, 17, 59)));
    }

    #[test]
    fn surcharge_follows_venue_offset() {
        // 10:00 UTC is 18:00 at UTC+8.
        let engine = PricingEngine::new(FixedOffset::east_opt(8 * 3600).unwrap());
        assert!(engine.is_surcharged(utc(2025, 1, 6, 10, 0)));
        assert_eq!(
            engine.seat_price(Money::from_units(100), SeatClass::Regular, utc(2025, 1, 6, 10, 0)),
            Money::from_units(120)
        );
    }

    #[test]
    fn rounding_is_half_up_on_the_final_product() {
        let engine = PricingEngine::default();
        // 0.05 × 0.7 = 0.035 → 0.04
        assert_eq!(
            engine.seat_price(Money::from_cents(5), SeatClass::Student, at(MONDAY_MORNING)),
            Money::from_cents(4)
        );
        // 0.01 × 1.3 × 1.2 = 0.0156 → 0.02
        assert_eq!(
            engine.seat_price(Money::from_cents(1), SeatClass::Couple, utc(2025, 1, 4, 10, 0)),
            Money::from_cents(2)
        );
    }

    #[test]
    fn quote_sums_lines() {
        let engine = PricingEngine::default();
        let showing = Showing {
            id: ShowingId::new(),
            title: "Matinee".to_string(),
            starts_at: at(MONDAY_MORNING),
            base_price: Money::from_units(100),
            total_seats: 2,
            available_seats: 2,
            sale_opens_at: utc(2025, 1, 1, 0, 0),
            last_bookable_at: utc(2025, 1, 6, 9, 45),
            status: ShowingStatus::OnSale,
        };
        let quote = engine.quote(
            &showing,
            &[
                (SeatCode::parse("A1").unwrap(), SeatClass::Premium),
                (SeatCode::parse("A2").unwrap(), SeatClass::Handicap),
            ],
        );
        assert!(!quote.surcharged);
        assert_eq!(quote.lines[0].price, Money::from_units(200));
        assert_eq!(quote.lines[1].price, Money::from_units(80));
        assert_eq!(quote.subtotal, Money::from_units(280));
    }

    #[test]
    fn quote_lines_follow_the_given_seats() {
        let engine = PricingEngine::default();
        let showing = Showing {
            id: ShowingId::new(),
            title: "Matinee".to_string(),
            starts_at: at(MONDAY_MORNING),
            base_price: Money::from_units(100),
            total_seats: 2,
            available_seats: 2,
            sale_opens_at: utc(2025, 1, 1, 0, 0),
            last_bookable_at: utc(2025, 1, 6, 9, 45),
            status: ShowingStatus::OnSale,
        };
        let seats = [
            (SeatCode::parse("B1").unwrap(), SeatClass::Regular),
            (SeatCode::parse("A1").unwrap(), SeatClass::Vip),
        ];
        let quote = engine.quote(&showing, &seats);
        let quoted: Vec<&str> = quote.lines.iter().map(|l| l.seat.as_str()).collect();
        assert_eq!(quoted, vec!["B1", "A1"]);
    }

    fn any_class() -> impl Strategy<Value = SeatClass> {
        prop_oneof![
            Just(SeatClass::Regular),
            Just(SeatClass::Vip),
            Just(SeatClass::Couple),
            Just(SeatClass::Handicap),
            Just(SeatClass::Premium),
            Just(SeatClass::Student),
        ]
    }

    proptest! {
        #[test]
        fn price_is_within_half_a_cent_of_exact(
            base in 0u64..10_000_000,
            class in any_class(),
            minutes in 0i64..(7 * 24 * 60),
        ) {
            let engine = PricingEngine::default();
            let starts_at = at(MONDAY_MORNING) + chrono::Duration::minutes(minutes);
            let price = engine.seat_price(Money::from_cents(base), class, starts_at);
            let surcharge = if engine.is_surcharged(starts_at) {
                SURCHARGE_BPS
            } else {
                BASIS_POINTS
            };

            let exact_times_scale =
                u128::from(base) * u128::from(class.multiplier_bps()) * u128::from(surcharge);
            let scale = 100_000_000u128;
            let price_scaled = u128::from(price.cents()) * scale;
            let diff = price_scaled.abs_diff(exact_times_scale);
            prop_assert!(diff * 2 <= scale);
        }

        #[test]
        fn surcharge_never_lowers_price(base in 0u64..10_000_000, class in any_class()) {
            let engine = PricingEngine::default();
            let plain = engine.seat_price(Money::from_cents(base), class, at(MONDAY_MORNING));
            let peak = engine.seat_price(Money::from_cents(base), class, utc(2025, 1, 6, 19, 0));
            prop_assert!(peak >= plain);
        }
    }
}
