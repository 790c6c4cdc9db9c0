//! Explicit per-entity state machines.
//!
//! Each mutable entity in the booking core (seat, booking, ledger entry) exposes
//! exactly one transition function. Guard checks live in that function and
//! nowhere else, so an illegal transition is rejected in one place.

use std::fmt::Debug;
use thiserror::Error;

/// A transition that the entity's state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal {entity} transition: {event} while {from}")]
pub struct IllegalTransition {
    /// Entity kind (`"seat"`, `"booking"`, ...)
    pub entity: &'static str,
    /// Debug rendering of the state the entity was in
    pub from: String,
    /// Debug rendering of the rejected event
    pub event: String,
}

impl IllegalTransition {
    /// Build an error from the current state and the rejected event.
    #[must_use]
    pub fn new(entity: &'static str, from: &impl Debug, event: &impl Debug) -> Self {
        Self {
            entity,
            from: format!("{from:?}"),
            event: format!("{event:?}"),
        }
    }
}

/// An entity whose state changes only through [`StateMachine::apply`].
pub trait StateMachine {
    /// Inputs the state machine understands.
    type Event;

    /// Apply `event`, mutating the entity in place.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and leaves the entity untouched when the
    /// event is not allowed from the current state.
    fn apply(&mut self, event: Self::Event) -> Result<(), IllegalTransition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
    }

    #[derive(Debug)]
    struct Toggle;

    impl StateMachine for Light {
        type Event = Toggle;

        fn apply(&mut self, _event: Toggle) -> Result<(), IllegalTransition> {
            *self = match self {
                Self::Off => Self::On,
                Self::On => Self::Off,
            };
            Ok(())
        }
    }

    #[test]
    fn error_message_names_entity_state_and_event() {
        let err = IllegalTransition::new("light", &Light::On, &Toggle);
        assert_eq!(err.to_string(), "illegal light transition: Toggle while On");
    }

    #[test]
    fn apply_mutates_in_place() {
        let mut light = Light::Off;
        assert!(light.apply(Toggle).is_ok());
        assert_eq!(light, Light::On);
    }
}
