//! Discount codes with capped redemptions.
//!
//! Each code's usage counters (global and per member) live in one versioned
//! record. Redemption is optimistic: read a snapshot, validate it, then write
//! only if the version is unchanged. A lost race re-reads and re-validates, so
//! the global cap can never be overshot and a cap reached mid-race is reported
//! as [`BookingError::DiscountUsedUp`] rather than as a conflict.

use crate::error::{BookingError, Result};
use crate::metrics::record_discount_redemption;
use crate::types::{MemberId, Money};
use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How a code's `value` is interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    /// `value` is an amount in cents
    FixedAmount,
    /// `value` is a whole percentage of the subtotal (0..=100)
    Percentage,
    /// `value` is a loyalty-point amount, one point per cent
    Points,
}

/// Discount code definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    /// The code members type in
    pub code: String,
    /// Value interpretation
    pub kind: DiscountKind,
    /// Cents or percent, depending on `kind`
    pub value: u64,
    /// Smallest subtotal the code applies to
    pub min_purchase: Money,
    /// Ceiling on the discount amount
    pub max_discount: Option<Money>,
    /// Valid from (inclusive)
    pub valid_from: DateTime<Utc>,
    /// Valid until (exclusive)
    pub valid_until: DateTime<Utc>,
    /// Redemptions allowed per member
    pub per_member_limit: u32,
    /// Redemptions allowed in total
    pub usage_limit: u32,
    /// Whether the code is switched on
    pub active: bool,
}

impl DiscountCode {
    /// Discount on `subtotal`: `min(raw, max_discount, subtotal)`.
    #[must_use]
    pub fn amount_for(&self, subtotal: Money) -> Money {
        let raw = match self.kind {
            DiscountKind::FixedAmount | DiscountKind::Points => Money::from_cents(self.value),
            DiscountKind::Percentage => subtotal.checked_percent(self.value).unwrap_or(subtotal),
        };
        let capped = self.max_discount.map_or(raw, |cap| raw.min(cap));
        capped.min(subtotal)
    }

    fn validate_definition(&self) -> Result<()> {
        let reject = |reason: &str| {
            Err(BookingError::InvalidRequest(format!(
                "discount {}: {reason}",
                self.code
            )))
        };
        if self.code.trim().is_empty() {
            return reject("code cannot be empty");
        }
        if self.kind == DiscountKind::Percentage && self.value > 100 {
            return reject("percentage above 100");
        }
        if self.valid_until <= self.valid_from {
            return reject("validity window is empty");
        }
        if self.usage_limit == 0 || self.per_member_limit == 0 {
            return reject("limits must be positive");
        }
        Ok(())
    }
}

/// Result of a successful `apply`; needed to undo it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    /// Code that was redeemed
    pub code: String,
    /// Member that redeemed it
    pub member_id: MemberId,
    /// Discount granted
    pub amount: Money,
}

/// Usage snapshot of a code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountUsage {
    /// Redemptions so far
    pub used: u32,
    /// Cap
    pub usage_limit: u32,
    /// Record version, bumped on every write
    pub version: u64,
}

#[derive(Debug)]
pub(crate) struct DiscountRecord {
    definition: DiscountCode,
    used: u32,
    per_member: HashMap<MemberId, u32>,
    version: u64,
}

impl DiscountRecord {
    /// Check `member` may redeem on `subtotal` at `now` and price the discount.
    fn evaluate(&self, member: MemberId, subtotal: Money, now: DateTime<Utc>) -> Result<Money> {
        let def = &self.definition;
        let invalid = |reason: String| BookingError::DiscountInvalid {
            code: def.code.clone(),
            reason,
        };
        if !def.active {
            return Err(invalid("inactive".to_string()));
        }
        if now < def.valid_from {
            return Err(invalid(format!("not valid before {}", def.valid_from)));
        }
        if now >= def.valid_until {
            return Err(invalid(format!("expired at {}", def.valid_until)));
        }
        if subtotal < def.min_purchase {
            return Err(invalid(format!("minimum purchase is {}", def.min_purchase)));
        }
        if self.used >= def.usage_limit {
            return Err(BookingError::DiscountUsedUp {
                code: def.code.clone(),
            });
        }
        if self.per_member.get(&member).copied().unwrap_or(0) >= def.per_member_limit {
            return Err(invalid("per-member limit reached".to_string()));
        }
        Ok(def.amount_for(subtotal))
    }
}

/// Registry and redemption counter for discount codes.
pub struct DiscountEngine {
    clock: Arc<dyn Clock>,
    codes: DashMap<String, Arc<RwLock<DiscountRecord>>>,
    wait: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for DiscountEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscountEngine")
            .field("codes", &self.codes.len())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

fn normalise(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl DiscountEngine {
    /// Create an engine.
    ///
    /// `wait` bounds each record lock; `max_retries` bounds how many times a
    /// redemption re-reads after losing a version race.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, wait: Duration, max_retries: u32) -> Self {
        Self {
            clock,
            codes: DashMap::new(),
            wait,
            max_retries,
        }
    }

    /// Register a code. Codes are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidRequest`] for an inconsistent definition,
    /// [`BookingError::AlreadyExists`] for a duplicate code.
    pub fn register(&self, mut definition: DiscountCode) -> Result<()> {
        definition.validate_definition()?;
        definition.code = normalise(&definition.code);
        let key = definition.code.clone();
        match self.codes.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(BookingError::AlreadyExists {
                entity: "discount",
                id: e.key().clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::info!(
                    code = %definition.code,
                    kind = ?definition.kind,
                    "Registered discount code"
                );
                slot.insert(Arc::new(RwLock::new(DiscountRecord {
                    definition,
                    used: 0,
                    per_member: HashMap::new(),
                    version: 0,
                })));
                Ok(())
            }
        }
    }

    pub(crate) fn record(&self, code: &str) -> Result<Arc<RwLock<DiscountRecord>>> {
        self.codes
            .get(&normalise(code))
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BookingError::DiscountInvalid {
                code: code.to_string(),
                reason: "unknown code".to_string(),
            })
    }

    fn busy(code: &str) -> BookingError {
        BookingError::Busy {
            resource: format!("discount {code}"),
        }
    }

    /// Price the discount without consuming a redemption.
    ///
    /// # Errors
    ///
    /// [`BookingError::DiscountInvalid`] or [`BookingError::DiscountUsedUp`]
    /// when the code cannot be used.
    pub async fn quote(&self, code: &str, member: MemberId, subtotal: Money) -> Result<Money> {
        let record = self.record(code)?;
        let guard = tokio::time::timeout(self.wait, record.read())
            .await
            .map_err(|_| Self::busy(code))?;
        guard.evaluate(member, subtotal, self.clock.now())
    }

    /// Redeem `code` for `member`, consuming one use.
    ///
    /// # Errors
    ///
    /// - [`BookingError::DiscountInvalid`] when the code cannot be used
    /// - [`BookingError::DiscountUsedUp`] when the cap is reached
    /// - [`BookingError::ConcurrentConflict`] when every retry lost a race and
    ///   the cap is still not reached
    /// - [`BookingError::Busy`] when the record lock is not granted in time
    pub async fn apply(&self, code: &str, member: MemberId, subtotal: Money) -> Result<Redemption> {
        let record = self.record(code)?;

        for attempt in 0..=self.max_retries {
            let (version, amount) = {
                let snapshot = tokio::time::timeout(self.wait, record.read())
                    .await
                    .map_err(|_| Self::busy(code))?;
                match snapshot.evaluate(member, subtotal, self.clock.now()) {
                    Ok(amount) => (snapshot.version, amount),
                    Err(err) => {
                        let outcome = if matches!(err, BookingError::DiscountUsedUp { .. }) {
                            "used_up"
                        } else {
                            "rejected"
                        };
                        record_discount_redemption(outcome);
                        return Err(err);
                    }
                }
            };

            let mut current = tokio::time::timeout(self.wait, record.write())
                .await
                .map_err(|_| Self::busy(code))?;
            if current.version != version {
                drop(current);
                tracing::debug!(code, attempt, "Discount version moved, re-reading");
                tokio::task::yield_now().await;
                continue;
            }

            current.used += 1;
            *current.per_member.entry(member).or_insert(0) += 1;
            current.version += 1;
            let redemption = Redemption {
                code: current.definition.code.clone(),
                member_id: member,
                amount,
            };
            drop(current);

            record_discount_redemption("applied");
            tracing::debug!(
                code = %redemption.code,
                %member,
                amount = %amount,
                "Discount redeemed"
            );
            return Ok(redemption);
        }

        record_discount_redemption("conflict");
        Err(BookingError::ConcurrentConflict {
            resource: format!("discount {}", normalise(code)),
        })
    }

    /// Give a redemption back (compensation or cancellation).
    ///
    /// # Errors
    ///
    /// [`BookingError::DiscountInvalid`] for an unknown code or
    /// [`BookingError::Busy`] when the record lock is not granted in time.
    pub async fn release(&self, redemption: &Redemption) -> Result<()> {
        let record = self.record(&redemption.code)?;
        let mut current = tokio::time::timeout(self.wait, record.write())
            .await
            .map_err(|_| Self::busy(&redemption.code))?;
        current.used = current.used.saturating_sub(1);
        if let Some(count) = current.per_member.get_mut(&redemption.member_id) {
            *count = count.saturating_sub(1);
        }
        current.version += 1;
        drop(current);
        record_discount_redemption("released");
        tracing::debug!(
            code = %redemption.code,
            member = %redemption.member_id,
            "Discount redemption released"
        );
        Ok(())
    }

    /// Usage counters of a code.
    ///
    /// # Errors
    ///
    /// [`BookingError::DiscountInvalid`] for an unknown code or
    /// [`BookingError::Busy`] when the record lock is not granted in time.
    pub async fn usage(&self, code: &str) -> Result<DiscountUsage> {
        let record = self.record(code)?;
        let guard = tokio::time::timeout(self.wait, record.read())
            .await
            .map_err(|_| Self::busy(code))?;
        Ok(DiscountUsage {
            used: guard.used,
            usage_limit: guard.definition.usage_limit,
            version: guard.version,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use boxoffice_testing::{FixedClock, race, utc};
    use proptest::prelude::*;

    fn code(kind: DiscountKind, value: u64, usage_limit: u32) -> DiscountCode {
        DiscountCode {
            code: "save50".to_string(),
            kind,
            value,
            min_purchase: Money::ZERO,
            max_discount: None,
            valid_from: utc(2025, 1, 1, 0, 0),
            valid_until: utc(2025, 2, 1, 0, 0),
            per_member_limit: 1,
            usage_limit,
            active: true,
        }
    }

    fn engine() -> DiscountEngine {
        DiscountEngine::new(
            Arc::new(FixedClock::new(utc(2025, 1, 6, 10, 0))),
            Duration::from_millis(500),
            8,
        )
    }

    #[test]
    fn amount_is_capped_by_max_and_subtotal() {
        let mut pct = code(DiscountKind::Percentage, 20, 1);
        assert_eq!(pct.amount_for(Money::from_units(300)), Money::from_units(60));
        pct.max_discount = Some(Money::from_units(50));
        assert_eq!(pct.amount_for(Money::from_units(300)), Money::from_units(50));

        let fixed = code(DiscountKind::FixedAmount, 50_000, 1);
        assert_eq!(fixed.amount_for(Money::from_units(300)), Money::from_units(300));
    }

    #[tokio::test]
    async fn quote_does_not_consume() {
        let engine = engine();
        engine.register(code(DiscountKind::FixedAmount, 5_000, 1)).unwrap();
        let member = MemberId::new();
        assert_eq!(
            engine.quote("SAVE50", member, Money::from_units(300)).await.unwrap(),
            Money::from_units(50)
        );
        assert_eq!(engine.usage("save50").await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn apply_then_release_restores_counts() {
        let engine = engine();
        engine.register(code(DiscountKind::FixedAmount, 5_000, 1)).unwrap();
        let member = MemberId::new();

        let redemption = engine.apply("save50", member, Money::from_units(300)).await.unwrap();
        assert_eq!(redemption.amount, Money::from_units(50));
        assert_eq!(
            engine.apply("save50", MemberId::new(), Money::from_units(300)).await.unwrap_err(),
            BookingError::DiscountUsedUp {
                code: "SAVE50".to_string()
            }
        );

        engine.release(&redemption).await.unwrap();
        let usage = engine.usage("SAVE50").await.unwrap();
        assert_eq!(usage.used, 0);
        assert_eq!(usage.version, 2);
        assert!(engine.apply("save50", member, Money::from_units(300)).await.is_ok());
    }

    #[tokio::test]
    async fn validation_failures_are_invalid() {
        let engine = engine();
        let mut def = code(DiscountKind::FixedAmount, 5_000, 10);
        def.min_purchase = Money::from_units(500);
        engine.register(def).unwrap();
        let mut late = code(DiscountKind::FixedAmount, 100, 10);
        late.code = "LATER".to_string();
        late.valid_from = utc(2025, 1, 10, 0, 0);
        engine.register(late).unwrap();

        let member = MemberId::new();
        assert!(matches!(
            engine.apply("SAVE50", member, Money::from_units(300)).await,
            Err(BookingError::DiscountInvalid { .. })
        ));
        assert!(matches!(
            engine.apply("LATER", member, Money::from_units(300)).await,
            Err(BookingError::DiscountInvalid { .. })
        ));
        assert!(matches!(
            engine.apply("NOPE", member, Money::from_units(300)).await,
            Err(BookingError::DiscountInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn per_member_limit_is_enforced() {
        let engine = engine();
        engine.register(code(DiscountKind::Points, 100, 10)).unwrap();
        let member = MemberId::new();
        engine.apply("SAVE50", member, Money::from_units(10)).await.unwrap();
        assert!(matches!(
            engine.apply("SAVE50", member, Money::from_units(10)).await,
            Err(BookingError::DiscountInvalid { .. })
        ));
        assert!(engine.apply("SAVE50", MemberId::new(), Money::from_units(10)).await.is_ok());
    }

    #[test]
    fn inconsistent_definitions_are_rejected() {
        let engine = engine();
        assert!(engine.register(code(DiscountKind::Percentage, 101, 1)).is_err());
        assert!(engine.register(code(DiscountKind::FixedAmount, 1, 0)).is_err());
        engine.register(code(DiscountKind::FixedAmount, 1, 1)).unwrap();
        assert!(matches!(
            engine.register(code(DiscountKind::FixedAmount, 1, 1)),
            Err(BookingError::AlreadyExists { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_redemptions_never_exceed_cap() {
        let engine = Arc::new(engine());
        engine.register(code(DiscountKind::FixedAmount, 100, 3)).unwrap();

        let results = race(16, |_| {
            let engine = Arc::clone(&engine);
            async move { engine.apply("SAVE50", MemberId::new(), Money::from_units(10)).await }
        })
        .await;

        let applied = results.iter().flatten().filter(|r| r.is_ok()).count();
        assert_eq!(applied, 3);
        for result in results.into_iter().flatten() {
            if let Err(err) = result {
                assert!(matches!(
                    err,
                    BookingError::DiscountUsedUp { .. } | BookingError::ConcurrentConflict { .. }
                ));
            }
        }
        assert_eq!(engine.usage("SAVE50").await.unwrap().used, 3);
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal_or_cap(
            value in 0u64..1_000_000,
            pct in 0u64..=100,
            cap in proptest::option::of(0u64..1_000_000),
            subtotal in 0u64..1_000_000,
        ) {
            let subtotal = Money::from_cents(subtotal);
            let cases = [(DiscountKind::FixedAmount, value), (DiscountKind::Percentage, pct)];
            for (kind, value) in cases {
                let mut def = code(kind, value, 1);
                def.max_discount = cap.map(Money::from_cents);
                let amount = def.amount_for(subtotal);
                prop_assert!(amount <= subtotal);
                if let Some(cap) = def.max_discount {
                    prop_assert!(amount <= cap);
                }
            }
        }
    }
}
