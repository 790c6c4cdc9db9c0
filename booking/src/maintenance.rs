//! Background maintenance loops.
//!
//! Three tokio interval loops run next to the HTTP server:
//!
//! - **lock sweep**: returns lapsed seat locks to `Available`
//! - **stale bookings**: cancels pending bookings past the payment window
//! - **rollover**: clears wallet running totals when the venue-local day or
//!   month changes, retrying wallets that were busy on the next tick
//!
//! Every loop stops when the shared `watch` channel flips to `true`.

use crate::config::MaintenanceConfig;
use crate::orchestrator::BookingOrchestrator;
use crate::seats::SeatLedger;
use crate::types::WalletId;
use crate::wallet::{LimitPeriod, WalletLedger};
use boxoffice_core::environment::Clock;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// How often each loop wakes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    /// Lapsed-lock sweep period
    pub lock_sweep: Duration,
    /// Stale-booking scan period
    pub stale_bookings: Duration,
    /// Rollover check period
    pub rollover_check: Duration,
}

impl From<&MaintenanceConfig> for MaintenanceSchedule {
    fn from(config: &MaintenanceConfig) -> Self {
        Self {
            lock_sweep: config.lock_sweep_interval(),
            stale_bookings: config.stale_booking_interval(),
            rollover_check: config.rollover_check_interval(),
        }
    }
}

/// Which running totals a rollover check should clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverDue {
    /// The venue-local day changed
    pub daily: bool,
    /// The venue-local month changed
    pub monthly: bool,
}

/// Remembers the last venue-local date seen and reports boundary crossings.
#[derive(Debug, Clone)]
pub struct PeriodRollover {
    offset: FixedOffset,
    last_seen: NaiveDate,
}

impl PeriodRollover {
    /// Start tracking from `now`; nothing is due until the date changes.
    #[must_use]
    pub fn new(offset: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            offset,
            last_seen: now.with_timezone(&offset).date_naive(),
        }
    }

    /// Compare `now` with the last date seen and move forward.
    ///
    /// A clock that moves backwards never triggers a reset.
    pub fn due(&mut self, now: DateTime<Utc>) -> RolloverDue {
        let today = now.with_timezone(&self.offset).date_naive();
        if today <= self.last_seen {
            return RolloverDue::default();
        }
        let last = self.last_seen;
        let monthly = (today.year(), today.month()) != (last.year(), last.month());
        self.last_seen = today;
        RolloverDue { daily: true, monthly }
    }
}

/// Handles the maintenance loops need.
pub struct Maintenance {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Seat ledger to sweep
    pub seats: Arc<SeatLedger>,
    /// Wallet ledger to roll over
    pub wallets: Arc<WalletLedger>,
    /// Orchestrator whose stale bookings expire
    pub orchestrator: Arc<BookingOrchestrator>,
    /// Venue offset for day and month boundaries
    pub venue_offset: FixedOffset,
    /// Loop periods
    pub schedule: MaintenanceSchedule,
}

impl Maintenance {
    /// Spawn all loops onto the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let seats = self.seats;
        let sweep = tokio::spawn(run_every(
            "lock_sweep",
            self.schedule.lock_sweep,
            shutdown.clone(),
            move || {
                let seats = Arc::clone(&seats);
                async move {
                    let swept = seats.sweep_expired_locks().await;
                    if swept > 0 {
                        tracing::debug!(swept, "Lapsed seat locks swept");
                    }
                }
            },
        ));

        let orchestrator = self.orchestrator;
        let stale = tokio::spawn(run_every(
            "stale_bookings",
            self.schedule.stale_bookings,
            shutdown.clone(),
            move || {
                let orchestrator = Arc::clone(&orchestrator);
                async move {
                    let expired = orchestrator.expire_stale_bookings().await;
                    if expired > 0 {
                        tracing::debug!(expired, "Stale bookings expired");
                    }
                }
            },
        ));

        let clock = self.clock;
        let wallets = self.wallets;
        let mut periods = PeriodRollover::new(self.venue_offset, clock.now());
        // Wallets a previous pass found busy.
        let stragglers: Arc<Mutex<Vec<(LimitPeriod, WalletId)>>> = Arc::default();
        let rollover = tokio::spawn(run_every(
            "rollover",
            self.schedule.rollover_check,
            shutdown,
            move || {
                let due = periods.due(clock.now());
                let wallets = Arc::clone(&wallets);
                let stragglers = Arc::clone(&stragglers);
                async move {
                    let mut pending = stragglers.lock().await;
                    let carried = std::mem::take(&mut *pending);
                    let periods = [
                        (LimitPeriod::Daily, due.daily),
                        (LimitPeriod::Monthly, due.monthly),
                    ];
                    for (period, is_due) in periods {
                        let report = if is_due {
                            match period {
                                LimitPeriod::Daily => wallets.reset_daily().await,
                                LimitPeriod::Monthly => wallets.reset_monthly().await,
                            }
                        } else {
                            let ids: Vec<WalletId> = carried
                                .iter()
                                .filter(|(p, _)| *p == period)
                                .map(|(_, id)| *id)
                                .collect();
                            if ids.is_empty() {
                                continue;
                            }
                            wallets.reset_wallets(period, &ids).await
                        };
                        pending.extend(report.busy.into_iter().map(|id| (period, id)));
                    }
                }
            },
        ));

        vec![sweep, stale, rollover]
    }
}

async fn run_every<F, Fut>(
    task: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(task, period_ms = period.as_millis(), "Maintenance task started");

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!(task, "Maintenance task stopped");
}
