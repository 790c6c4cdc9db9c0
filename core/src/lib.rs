//! # Boxoffice Core
//!
//! Core traits and value types shared by every Boxoffice crate.
//!
//! This crate provides the small set of abstractions the booking core is built on:
//!
//! - **Environment**: injected dependencies (the [`environment::Clock`])
//! - **Money**: integer minor-unit amounts with checked arithmetic
//! - **State machines**: a single transition function per entity that rejects
//!   illegal transitions instead of scattering guard checks
//!
//! ## Architecture Principles
//!
//! - Dependency Injection via Environment
//! - Entities referenced by id, owned by exactly one ledger
//! - Every state change goes through one `apply` function
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::{IllegalTransition, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Door {
//!     Open,
//!     Closed,
//! }
//!
//! #[derive(Debug)]
//! enum DoorEvent {
//!     Close,
//! }
//!
//! impl StateMachine for Door {
//!     type Event = DoorEvent;
//!
//!     fn apply(&mut self, event: DoorEvent) -> Result<(), IllegalTransition> {
//!         match (*self, &event) {
//!             (Door::Open, DoorEvent::Close) => {
//!                 *self = Door::Closed;
//!                 Ok(())
//!             }
//!             (from, _) => Err(IllegalTransition::new("door", &from, &event)),
//!         }
//!     }
//! }
//!
//! let mut door = Door::Open;
//! assert!(door.apply(DoorEvent::Close).is_ok());
//! assert!(door.apply(DoorEvent::Close).is_err());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod money;
pub mod state_machine;

pub use money::Money;
pub use state_machine::{IllegalTransition, StateMachine};

/// Environment module - Dependency injection traits
///
/// All time-dependent decisions (lock expiry, stale bookings, validity windows,
/// period rollover) read the current instant through [`Clock`](environment::Clock)
/// so tests can drive time explicitly.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use boxoffice_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
