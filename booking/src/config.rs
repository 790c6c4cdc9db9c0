//! Configuration management for the booking service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! `.env` files are honoured by the server binary through `dotenvy`.

use boxoffice_runtime::RetryPolicy;
use chrono::{FixedOffset, Offset};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Booking rules
    pub booking: BookingConfig,
    /// Retry policy for compensating actions
    pub compensation: CompensationConfig,
    /// Background maintenance cadence
    pub maintenance: MaintenanceConfig,
}

/// Application server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Seed a demo showing, member and wallet at startup
    pub seed_demo: bool,
}

/// Booking rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// How long a seat lock lasts, in seconds (default: 10 minutes)
    pub seat_hold_ttl: u64,
    /// How long a booking may stay pending before it is expired, in seconds
    /// (default: 15 minutes)
    pub pending_timeout: u64,
    /// Maximum seats in one booking
    pub max_seats: usize,
    /// Upper bound on any entity lock wait, in milliseconds
    pub lock_wait_ms: u64,
    /// Optimistic retries for discount redemption
    pub discount_cas_retries: u32,
    /// Venue offset from UTC in minutes, for weekend/peak pricing and
    /// booking-number dates
    pub venue_utc_offset_minutes: i32,
}

/// Retry policy for compensating actions (refunds, seat and discount releases)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
}

/// Background maintenance cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between lapsed-lock sweeps
    pub lock_sweep_interval: u64,
    /// Seconds between stale-booking scans
    pub stale_booking_interval: u64,
    /// Seconds between day/month rollover checks
    pub rollover_check_interval: u64,
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed(&lookup, "PORT", 8080),
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info,boxoffice=debug".to_string()),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT", 30),
                seed_demo: parsed(&lookup, "BOXOFFICE_SEED_DEMO", false),
            },
            booking: BookingConfig {
                seat_hold_ttl: parsed(&lookup, "BOXOFFICE_SEAT_HOLD_TTL", 600), // 10 minutes
                pending_timeout: parsed(&lookup, "BOXOFFICE_PENDING_TIMEOUT", 900), // 15 minutes
                max_seats: parsed(&lookup, "BOXOFFICE_MAX_SEATS", 4),
                lock_wait_ms: parsed(&lookup, "BOXOFFICE_LOCK_WAIT_MS", 500),
                discount_cas_retries: parsed(&lookup, "BOXOFFICE_DISCOUNT_CAS_RETRIES", 8),
                venue_utc_offset_minutes: parsed(&lookup, "BOXOFFICE_VENUE_UTC_OFFSET_MINUTES", 0),
            },
            compensation: CompensationConfig {
                max_retries: parsed(&lookup, "BOXOFFICE_COMPENSATION_MAX_RETRIES", 5),
                initial_delay_ms: parsed(&lookup, "BOXOFFICE_COMPENSATION_INITIAL_DELAY_MS", 50),
                max_delay_ms: parsed(&lookup, "BOXOFFICE_COMPENSATION_MAX_DELAY_MS", 2_000),
            },
            maintenance: MaintenanceConfig {
                lock_sweep_interval: parsed(&lookup, "BOXOFFICE_LOCK_SWEEP_INTERVAL", 30),
                stale_booking_interval: parsed(&lookup, "BOXOFFICE_STALE_BOOKING_INTERVAL", 60),
                rollover_check_interval: parsed(&lookup, "BOXOFFICE_ROLLOVER_CHECK_INTERVAL", 60),
            },
        }
    }

    /// Socket address string for the HTTP listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl BookingConfig {
    /// Seat lock lifetime
    #[must_use]
    pub const fn seat_hold_ttl(&self) -> Duration {
        Duration::from_secs(self.seat_hold_ttl)
    }

    /// Pending booking lifetime
    #[must_use]
    pub const fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout)
    }

    /// Entity lock wait bound
    #[must_use]
    pub const fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    /// Venue offset; out-of-range values fall back to UTC.
    #[must_use]
    pub fn venue_offset(&self) -> FixedOffset {
        self.venue_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| chrono::Utc.fix())
    }
}

impl CompensationConfig {
    /// Build the retry policy used for compensations.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }
}

impl MaintenanceConfig {
    /// Interval between lapsed-lock sweeps
    #[must_use]
    pub const fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval)
    }

    /// Interval between stale-booking scans
    #[must_use]
    pub const fn stale_booking_interval(&self) -> Duration {
        Duration::from_secs(self.stale_booking_interval)
    }

    /// Interval between rollover checks
    #[must_use]
    pub const fn rollover_check_interval(&self) -> Duration {
        Duration::from_secs(self.rollover_check_interval)
    }
}
