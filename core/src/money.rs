//! Money amounts in minor units (cents).
//!
//! Amounts are unsigned, so a balance can never go negative by construction:
//! every subtraction is checked and callers turn `None` into a domain error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Denominator for basis-point scaling (1.0 == 10 000 bps).
pub const BASIS_POINTS: u64 = 10_000;

/// Money amount in minor units (avoids floating point issues)
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units (cents)
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units, saturating on overflow
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts two amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts two amounts, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Scales the amount by `bps` basis points, rounding half up.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub const fn checked_scale_bps(self, bps: u64) -> Option<Self> {
        let Some(product) = self.0.checked_mul(bps) else {
            return None;
        };
        match product.checked_add(BASIS_POINTS / 2) {
            Some(rounded) => Some(Self(rounded / BASIS_POINTS)),
            None => None,
        }
    }

    /// Returns `percent`% of this amount, rounded down.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub const fn checked_percent(self, percent: u64) -> Option<Self> {
        match self.0.checked_mul(percent) {
            Some(product) => Some(Self(product / 100)),
            None => None,
        }
    }

    /// Returns the smaller of two amounts
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| Self(acc.0.saturating_add(m.0)))
    }
}
