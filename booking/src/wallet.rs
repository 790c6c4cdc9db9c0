//! Stored-value wallets and their append-only ledger.
//!
//! A wallet and its entries live together behind one per-wallet mutex, so a
//! balance change and the entry that records it are written in the same
//! critical section. Entries are never deleted; a refund marks the original
//! entry `Refunded` and appends a linked `Refund` entry.
//!
//! Daily and monthly running totals grow with every debit and outgoing
//! transfer, and are only ever
//! cleared by [`WalletLedger::reset_daily`] / [`WalletLedger::reset_monthly`]
//! (or [`WalletLedger::reset_wallets`] for stragglers).

use crate::error::{BookingError, Result};
use crate::metrics::{record_wallet_debit, record_wallet_refund};
use crate::types::{LedgerEntryId, MemberId, Money, WalletId};
use boxoffice_core::environment::Clock;
use boxoffice_core::{IllegalTransition, StateMachine};
use boxoffice_runtime::{EntityTable, LockError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Wallet
// ============================================================================

/// Wallet status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    /// Usable
    Active,
    /// Temporarily blocked by the member or support
    Frozen,
    /// Blocked for review
    Suspended,
    /// Permanently closed
    Closed,
}

/// Which running total a limit applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitPeriod {
    /// Calendar day in venue time
    Daily,
    /// Calendar month in venue time
    Monthly,
}

/// Spending limits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLimits {
    /// Maximum spend per day
    pub daily: Money,
    /// Maximum spend per month
    pub monthly: Money,
}

impl Default for WalletLimits {
    fn default() -> Self {
        Self {
            daily: Money::from_units(5_000),
            monthly: Money::from_units(50_000),
        }
    }
}

/// Stored-value wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Wallet id
    pub id: WalletId,
    /// Owning member
    pub member_id: MemberId,
    /// Current balance
    pub balance: Money,
    /// Spending limits
    pub limits: WalletLimits,
    /// Spent since the last daily reset
    pub daily_total: Money,
    /// Spent since the last monthly reset
    pub monthly_total: Money,
    /// Status
    pub status: WalletStatus,
    /// When the wallet was opened
    pub opened_at: DateTime<Utc>,
    /// Last balance or status change
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Ledger entries
// ============================================================================

/// Kind of money movement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Money added by the member
    TopUp,
    /// Money spent on a booking
    Payment,
    /// Money returned for an earlier payment
    Refund,
    /// Money moved between two wallets; both sides get an entry
    Transfer,
    /// Manual correction by support
    Adjustment,
}

/// Entry lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// Created, balance not yet moved
    Pending,
    /// Balance moved
    Completed,
    /// Never took effect
    Failed,
    /// Withdrawn before taking effect
    Cancelled,
    /// A linked refund entry reversed it
    Refunded,
}

/// Entry lifecycle events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryEvent {
    /// The balance moved
    Complete {
        /// Balance after the movement
        balance_after: Money,
        /// When
        at: DateTime<Utc>,
    },
    /// The movement did not happen
    Fail {
        /// When
        at: DateTime<Utc>,
    },
    /// The movement was withdrawn
    Cancel {
        /// When
        at: DateTime<Utc>,
    },
    /// A refund entry reversed this payment
    Refund {
        /// The linked refund entry
        refund_entry: LedgerEntryId,
        /// When
        at: DateTime<Utc>,
    },
}

/// Immutable-once-completed record of a money movement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Entry id
    pub id: LedgerEntryId,
    /// Wallet
    pub wallet_id: WalletId,
    /// Kind
    pub kind: EntryKind,
    /// Status
    pub status: EntryStatus,
    /// Amount moved
    pub amount: Money,
    /// Balance right after this entry took effect
    pub balance_after: Option<Money>,
    /// Caller reference, e.g. a booking number
    pub reference: Option<String>,
    /// For a refund: the payment it reverses. For a refunded payment: its refund.
    pub related_entry: Option<LedgerEntryId>,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn pending(
        wallet_id: WalletId,
        kind: EntryKind,
        amount: Money,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            wallet_id,
            kind,
            status: EntryStatus::Pending,
            amount,
            balance_after: None,
            reference,
            related_entry: None,
            created_at: at,
            updated_at: at,
        }
    }
}

impl StateMachine for LedgerEntry {
    type Event = EntryEvent;

    fn apply(&mut self, event: EntryEvent) -> std::result::Result<(), IllegalTransition> {
        match (self.status, event) {
            (EntryStatus::Pending, EntryEvent::Complete { balance_after, at }) => {
                self.status = EntryStatus::Completed;
                self.balance_after = Some(balance_after);
                self.updated_at = at;
            }
            (EntryStatus::Pending, EntryEvent::Fail { at }) => {
                self.status = EntryStatus::Failed;
                self.updated_at = at;
            }
            (EntryStatus::Pending, EntryEvent::Cancel { at }) => {
                self.status = EntryStatus::Cancelled;
                self.updated_at = at;
            }
            (EntryStatus::Completed, EntryEvent::Refund { refund_entry, at })
                if self.kind == EntryKind::Payment =>
            {
                self.status = EntryStatus::Refunded;
                self.related_entry = Some(refund_entry);
                self.updated_at = at;
            }
            (status, event) => return Err(IllegalTransition::new("ledger entry", &status, &event)),
        }
        Ok(())
    }
}

/// Reason for a credit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditReason {
    /// Member added funds; needs an active wallet
    TopUp,
    /// Money returned; allowed on any wallet that is not closed
    Refund,
}

/// Direction of a manual correction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentDirection {
    /// Add to the balance
    Increase,
    /// Take from the balance
    Decrease,
}

/// Outcome of a period rollover
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RolloverReport {
    /// Wallets whose running total was cleared
    pub reset: usize,
    /// Wallets that stayed busy; retried on the next pass
    pub busy: Vec<WalletId>,
}

// ============================================================================
// Ledger
// ============================================================================

/// Outcome of a successful spend check
struct Spend {
    balance_after: Money,
    daily_total: Money,
    monthly_total: Money,
}

#[derive(Debug)]
struct WalletAccount {
    wallet: Wallet,
    entries: Vec<LedgerEntry>,
}

impl WalletAccount {
    fn entry_mut(&mut self, id: LedgerEntryId) -> Option<&mut LedgerEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Append an entry for `amount` and move the balance in one step.
    fn post(
        &mut self,
        kind: EntryKind,
        amount: Money,
        balance_after: Money,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let mut entry = LedgerEntry::pending(self.wallet.id, kind, amount, reference, at);
        entry.apply(EntryEvent::Complete { balance_after, at })?;
        self.wallet.balance = balance_after;
        self.wallet.updated_at = at;
        self.entries.push(entry.clone());
        Ok(entry)
    }
}

/// Wallet balances, limits and entries.
pub struct WalletLedger {
    clock: Arc<dyn Clock>,
    accounts: EntityTable<WalletId, WalletAccount>,
    entry_index: DashMap<LedgerEntryId, WalletId>,
}

impl std::fmt::Debug for WalletLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLedger")
            .field("accounts", &self.accounts)
            .field("entries", &self.entry_index.len())
            .finish_non_exhaustive()
    }
}

impl WalletLedger {
    /// Create a ledger; `wait` bounds every wallet mutex acquisition.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, wait: Duration) -> Self {
        Self {
            clock,
            accounts: EntityTable::new("wallet", wait),
            entry_index: DashMap::new(),
        }
    }

    /// Open an active wallet, optionally funded with an initial top-up.
    ///
    /// # Errors
    ///
    /// [`BookingError::AlreadyExists`] on an id collision.
    pub fn open_wallet(
        &self,
        member_id: MemberId,
        limits: WalletLimits,
        initial_balance: Money,
    ) -> Result<Wallet> {
        let now = self.clock.now();
        let wallet = Wallet {
            id: WalletId::new(),
            member_id,
            balance: Money::ZERO,
            limits,
            daily_total: Money::ZERO,
            monthly_total: Money::ZERO,
            status: WalletStatus::Active,
            opened_at: now,
            updated_at: now,
        };
        let mut account = WalletAccount {
            wallet,
            entries: Vec::new(),
        };
        if !initial_balance.is_zero() {
            let entry = account.post(
                EntryKind::TopUp,
                initial_balance,
                initial_balance,
                Some("opening balance".to_string()),
                now,
            )?;
            self.entry_index.insert(entry.id, account.wallet.id);
        }
        let wallet = account.wallet.clone();
        self.accounts.insert(wallet.id, account)?;
        tracing::info!(
            wallet_id = %wallet.id,
            %member_id,
            balance = %wallet.balance,
            "Opened wallet"
        );
        Ok(wallet)
    }

    /// Charge `amount` to the wallet.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidRequest`] for a zero amount
    /// - [`BookingError::WalletNotUsable`] unless the wallet is active
    /// - [`BookingError::InsufficientBalance`] when the balance is short
    /// - [`BookingError::LimitExceeded`] when a running total would pass its limit
    /// - [`BookingError::Busy`] when the wallet mutex is not granted in time
    pub async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Money,
        reference: &str,
    ) -> Result<LedgerEntry> {
        if amount.is_zero() {
            return Err(BookingError::InvalidRequest(
                "debit amount must be positive".to_string(),
            ));
        }
        let mut account = self.accounts.lock(&wallet_id).await?;
        let spend = Self::check_spendable(&account.wallet, amount)?;

        let now = self.clock.now();
        let entry = account.post(
            EntryKind::Payment,
            amount,
            spend.balance_after,
            Some(reference.to_string()),
            now,
        )?;
        account.wallet.daily_total = spend.daily_total;
        account.wallet.monthly_total = spend.monthly_total;
        drop(account);

        self.entry_index.insert(entry.id, wallet_id);
        record_wallet_debit(amount);
        tracing::info!(
            %wallet_id,
            entry_id = %entry.id,
            amount = %amount,
            reference,
            "Wallet debited"
        );
        Ok(entry)
    }

    /// Balance and running totals after spending `amount` from `wallet`.
    fn check_spendable(wallet: &Wallet, amount: Money) -> Result<Spend> {
        let wallet_id = wallet.id;
        if wallet.status != WalletStatus::Active {
            return Err(BookingError::WalletNotUsable {
                wallet_id,
                status: wallet.status,
            });
        }
        let balance_after = wallet
            .balance
            .checked_sub(amount)
            .ok_or(BookingError::InsufficientBalance {
                wallet_id,
                balance: wallet.balance,
                requested: amount,
            })?;
        let daily_total = Self::within_limit(
            wallet_id,
            LimitPeriod::Daily,
            wallet.daily_total,
            amount,
            wallet.limits.daily,
        )?;
        let monthly_total = Self::within_limit(
            wallet_id,
            LimitPeriod::Monthly,
            wallet.monthly_total,
            amount,
            wallet.limits.monthly,
        )?;
        Ok(Spend {
            balance_after,
            daily_total,
            monthly_total,
        })
    }

    fn within_limit(
        wallet_id: WalletId,
        period: LimitPeriod,
        total: Money,
        amount: Money,
        limit: Money,
    ) -> Result<Money> {
        let attempted_total = total.checked_add(amount).unwrap_or(Money::from_cents(u64::MAX));
        if attempted_total > limit {
            return Err(BookingError::LimitExceeded {
                wallet_id,
                period,
                limit,
                attempted_total,
            });
        }
        Ok(attempted_total)
    }

    /// Add `amount` to the wallet. Credits never touch the running totals.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidRequest`] for a zero amount or balance overflow
    /// - [`BookingError::WalletNotUsable`] for a top-up on a non-active wallet
    ///   or any credit on a closed wallet
    /// - [`BookingError::Busy`] when the wallet mutex is not granted in time
    pub async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Money,
        reason: CreditReason,
    ) -> Result<LedgerEntry> {
        if amount.is_zero() {
            return Err(BookingError::InvalidRequest(
                "credit amount must be positive".to_string(),
            ));
        }
        let mut account = self.accounts.lock(&wallet_id).await?;
        Self::check_creditable(&account.wallet, reason)?;
        let balance_after = account
            .wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| BookingError::InvalidRequest("balance overflow".to_string()))?;
        let kind = match reason {
            CreditReason::TopUp => EntryKind::TopUp,
            CreditReason::Refund => EntryKind::Refund,
        };
        let entry = account.post(kind, amount, balance_after, None, self.clock.now())?;
        drop(account);

        self.entry_index.insert(entry.id, wallet_id);
        tracing::info!(
            %wallet_id,
            entry_id = %entry.id,
            amount = %amount,
            ?reason,
            "Wallet credited"
        );
        Ok(entry)
    }

    /// Move `amount` from one active wallet to another.
    ///
    /// Both wallets are locked in ascending id order. The sender's balance and
    /// limits are checked like a debit and the outgoing amount counts toward
    /// its running totals. Each side gets a `Transfer` entry linked to the
    /// other. Returns `(outgoing, incoming)`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidRequest`] for a zero amount, a transfer to
    ///   the same wallet, or balance overflow on the receiver
    /// - [`BookingError::WalletNotUsable`] unless both wallets are active
    /// - [`BookingError::InsufficientBalance`] when the sender is short
    /// - [`BookingError::LimitExceeded`] when a sender total would pass its limit
    /// - [`BookingError::Busy`] when a wallet mutex is not granted in time
    pub async fn transfer(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Money,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        if amount.is_zero() {
            return Err(BookingError::InvalidRequest(
                "transfer amount must be positive".to_string(),
            ));
        }
        if from == to {
            return Err(BookingError::InvalidRequest(
                "cannot transfer to the same wallet".to_string(),
            ));
        }
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first = self.accounts.lock(&first).await?;
        let second = self.accounts.lock(&second).await?;
        let (mut sender, mut receiver) = if from < to {
            (first, second)
        } else {
            (second, first)
        };

        let spend = Self::check_spendable(&sender.wallet, amount)?;
        Self::check_creditable(&receiver.wallet, CreditReason::TopUp)?;
        let receiver_balance = receiver
            .wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| BookingError::InvalidRequest("balance overflow".to_string()))?;

        let now = self.clock.now();
        let mut outgoing = sender.post(
            EntryKind::Transfer,
            amount,
            spend.balance_after,
            Some(format!("transfer to {to}")),
            now,
        )?;
        sender.wallet.daily_total = spend.daily_total;
        sender.wallet.monthly_total = spend.monthly_total;
        let mut incoming = receiver.post(
            EntryKind::Transfer,
            amount,
            receiver_balance,
            Some(format!("transfer from {from}")),
            now,
        )?;
        outgoing.related_entry = Some(incoming.id);
        incoming.related_entry = Some(outgoing.id);
        if let Some(stored) = sender.entry_mut(outgoing.id) {
            stored.related_entry = Some(incoming.id);
        }
        if let Some(stored) = receiver.entry_mut(incoming.id) {
            stored.related_entry = Some(outgoing.id);
        }
        drop(sender);
        drop(receiver);

        self.entry_index.insert(outgoing.id, from);
        self.entry_index.insert(incoming.id, to);
        tracing::info!(%from, %to, amount = %amount, "Wallet transfer");
        Ok((outgoing, incoming))
    }

    /// Correct a wallet's balance by hand, recorded as an `Adjustment` entry.
    ///
    /// Allowed on any wallet that is not closed. Adjustments never touch the
    /// running totals.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidRequest`] for a zero amount or balance overflow
    /// - [`BookingError::WalletNotUsable`] for a closed wallet
    /// - [`BookingError::InsufficientBalance`] when a decrease exceeds the balance
    /// - [`BookingError::Busy`] when the wallet mutex is not granted in time
    pub async fn adjust(
        &self,
        wallet_id: WalletId,
        direction: AdjustmentDirection,
        amount: Money,
        note: &str,
    ) -> Result<LedgerEntry> {
        if amount.is_zero() {
            return Err(BookingError::InvalidRequest(
                "adjustment amount must be positive".to_string(),
            ));
        }
        let mut account = self.accounts.lock(&wallet_id).await?;
        Self::check_creditable(&account.wallet, CreditReason::Refund)?;
        let balance = account.wallet.balance;
        let balance_after = match direction {
            AdjustmentDirection::Increase => balance
                .checked_add(amount)
                .ok_or_else(|| BookingError::InvalidRequest("balance overflow".to_string()))?,
            AdjustmentDirection::Decrease => {
                balance.checked_sub(amount).ok_or(BookingError::InsufficientBalance {
                    wallet_id,
                    balance,
                    requested: amount,
                })?
            }
        };
        let entry = account.post(
            EntryKind::Adjustment,
            amount,
            balance_after,
            Some(note.to_string()),
            self.clock.now(),
        )?;
        drop(account);

        self.entry_index.insert(entry.id, wallet_id);
        tracing::warn!(
            %wallet_id,
            entry_id = %entry.id,
            ?direction,
            amount = %amount,
            note,
            "Wallet adjusted"
        );
        Ok(entry)
    }

    fn check_creditable(wallet: &Wallet, reason: CreditReason) -> Result<()> {
        let usable = match reason {
            CreditReason::TopUp => wallet.status == WalletStatus::Active,
            CreditReason::Refund => wallet.status != WalletStatus::Closed,
        };
        if usable {
            Ok(())
        } else {
            Err(BookingError::WalletNotUsable {
                wallet_id: wallet.id,
                status: wallet.status,
            })
        }
    }

    /// Reverse a completed payment with a linked refund entry.
    ///
    /// Idempotent: refunding an already refunded payment returns the existing
    /// refund entry without moving money again.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown entry
    /// - [`BookingError::IllegalTransition`] if the entry is not a completed payment
    /// - [`BookingError::WalletNotUsable`] if the wallet is closed
    /// - [`BookingError::Busy`] when the wallet mutex is not granted in time
    pub async fn refund(&self, entry_id: LedgerEntryId) -> Result<LedgerEntry> {
        let wallet_id = self
            .entry_index
            .get(&entry_id)
            .map(|e| *e.value())
            .ok_or_else(|| BookingError::not_found("ledger entry", entry_id))?;
        let mut account = self.accounts.lock(&wallet_id).await?;
        let original = account
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("ledger entry", entry_id))?;

        if original.status == EntryStatus::Refunded {
            let existing = original
                .related_entry
                .and_then(|id| account.entries.iter().find(|e| e.id == id).cloned())
                .ok_or_else(|| BookingError::not_found("refund entry", entry_id))?;
            tracing::debug!(%wallet_id, %entry_id, "Payment already refunded");
            return Ok(existing);
        }

        let now = self.clock.now();
        // Validate the transition before any money moves.
        let mut check = original.clone();
        check.apply(EntryEvent::Refund {
            refund_entry: LedgerEntryId::new(),
            at: now,
        })?;
        Self::check_creditable(&account.wallet, CreditReason::Refund)?;

        let balance_after = account
            .wallet
            .balance
            .checked_add(original.amount)
            .ok_or_else(|| BookingError::InvalidRequest("balance overflow".to_string()))?;
        let mut refund = account.post(
            EntryKind::Refund,
            original.amount,
            balance_after,
            original.reference.clone(),
            now,
        )?;
        refund.related_entry = Some(entry_id);
        if let Some(stored) = account.entry_mut(refund.id) {
            stored.related_entry = Some(entry_id);
        }
        if let Some(stored) = account.entry_mut(entry_id) {
            stored.apply(EntryEvent::Refund {
                refund_entry: refund.id,
                at: now,
            })?;
        }
        drop(account);

        self.entry_index.insert(refund.id, wallet_id);
        record_wallet_refund(refund.amount);
        tracing::info!(
            %wallet_id,
            %entry_id,
            refund_id = %refund.id,
            amount = %refund.amount,
            "Payment refunded"
        );
        Ok(refund)
    }

    /// Clear every wallet's daily running total.
    pub async fn reset_daily(&self) -> RolloverReport {
        self.reset(LimitPeriod::Daily).await
    }

    /// Clear every wallet's monthly running total.
    pub async fn reset_monthly(&self) -> RolloverReport {
        self.reset(LimitPeriod::Monthly).await
    }

    /// Clear one period's running total on the given wallets only, e.g. the
    /// ones an earlier rollover reported busy.
    pub async fn reset_wallets(
        &self,
        period: LimitPeriod,
        wallet_ids: &[WalletId],
    ) -> RolloverReport {
        self.reset_each(period, wallet_ids.iter().copied()).await
    }

    async fn reset(&self, period: LimitPeriod) -> RolloverReport {
        self.reset_each(period, self.accounts.keys()).await
    }

    async fn reset_each(
        &self,
        period: LimitPeriod,
        wallet_ids: impl IntoIterator<Item = WalletId>,
    ) -> RolloverReport {
        let mut report = RolloverReport::default();
        for wallet_id in wallet_ids {
            match self.accounts.lock(&wallet_id).await {
                Ok(mut account) => {
                    match period {
                        LimitPeriod::Daily => account.wallet.daily_total = Money::ZERO,
                        LimitPeriod::Monthly => account.wallet.monthly_total = Money::ZERO,
                    }
                    report.reset += 1;
                }
                Err(err @ LockError::Timeout { .. }) => {
                    tracing::warn!(
                        %wallet_id,
                        ?period,
                        error = %err,
                        "Wallet busy during rollover"
                    );
                    report.busy.push(wallet_id);
                }
                Err(err) => {
                    tracing::warn!(
                        %wallet_id,
                        ?period,
                        error = %err,
                        "Wallet skipped during rollover"
                    );
                }
            }
        }
        tracing::info!(
            ?period,
            reset = report.reset,
            busy = report.busy.len(),
            "Running totals reset"
        );
        report
    }

    /// Change a wallet's status. A closed wallet stays closed.
    ///
    /// # Errors
    ///
    /// [`BookingError::IllegalTransition`] when reopening a closed wallet,
    /// [`BookingError::NotFound`] or [`BookingError::Busy`] otherwise.
    pub async fn set_status(&self, wallet_id: WalletId, status: WalletStatus) -> Result<Wallet> {
        let mut account = self.accounts.lock(&wallet_id).await?;
        if account.wallet.status == WalletStatus::Closed && status != WalletStatus::Closed {
            return Err(IllegalTransition::new("wallet", &account.wallet.status, &status).into());
        }
        account.wallet.status = status;
        account.wallet.updated_at = self.clock.now();
        tracing::info!(%wallet_id, ?status, "Wallet status changed");
        Ok(account.wallet.clone())
    }

    /// Snapshot of a wallet.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Busy`].
    pub async fn wallet(&self, wallet_id: WalletId) -> Result<Wallet> {
        Ok(self.accounts.lock(&wallet_id).await?.wallet.clone())
    }

    /// All entries of a wallet, oldest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Busy`].
    pub async fn entries(&self, wallet_id: WalletId) -> Result<Vec<LedgerEntry>> {
        Ok(self.accounts.lock(&wallet_id).await?.entries.clone())
    }

    /// One entry.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Busy`].
    pub async fn entry(&self, entry_id: LedgerEntryId) -> Result<LedgerEntry> {
        let wallet_id = self
            .entry_index
            .get(&entry_id)
            .map(|e| *e.value())
            .ok_or_else(|| BookingError::not_found("ledger entry", entry_id))?;
        let account = self.accounts.lock(&wallet_id).await?;
        account
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("ledger entry", entry_id))
    }
}
