//! Cab Events
//!
//! Discrete events raised by the input/AI layer and by restore. Each event
//! maps to exactly one flag transition on the locomotive component
//! (`LocomotiveControls::signal_event`); events with no flag to mutate there
//! (Forward/Reverse) are recorded for train-level consumers only.

use serde::{Deserialize, Serialize};

/// Headlight ordinal: off.
pub const HEADLIGHT_OFF: u8 = 0;
/// Headlight ordinal: dimmed.
pub const HEADLIGHT_DIM: u8 = 1;
/// Headlight ordinal: full beam.
pub const HEADLIGHT_FULL: u8 = 2;

/// A discrete cab event.
///
/// This is a closed set; unrecognized events at any dispatch site are no-ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarEvent {
    /// Bell started ringing
    BellOn,
    /// Bell stopped
    BellOff,
    /// Horn pressed
    HornOn,
    /// Horn released
    HornOff,
    /// Sander engaged
    SanderOn,
    /// Sander disengaged
    SanderOff,
    /// Wipers started
    WiperOn,
    /// Wipers stopped
    WiperOff,
    /// Headlight switched off
    HeadlightOff,
    /// Headlight dimmed
    HeadlightDim,
    /// Headlight on full beam
    HeadlightFull,
    /// Reverser moved to forward
    Forward,
    /// Reverser moved to reverse
    Reverse,
}

/// Step the headlight one position and return the event to dispatch.
///
/// Two distinct transition tables, selected by the `dim_only` modifier:
/// the plain sequence brightens (off → dim → full), the dim-only sequence
/// darkens (full → dim → off). Each table clamps at its own boundary and
/// returns `None` there.
pub fn headlight_step(current: u8, dim_only: bool) -> Option<CarEvent> {
    if dim_only {
        match current {
            HEADLIGHT_DIM => Some(CarEvent::HeadlightOff),
            HEADLIGHT_FULL => Some(CarEvent::HeadlightDim),
            _ => None,
        }
    } else {
        match current {
            HEADLIGHT_OFF => Some(CarEvent::HeadlightDim),
            HEADLIGHT_DIM => Some(CarEvent::HeadlightFull),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headlight_brighten_sequence() {
        assert_eq!(headlight_step(HEADLIGHT_OFF, false), Some(CarEvent::HeadlightDim));
        assert_eq!(headlight_step(HEADLIGHT_DIM, false), Some(CarEvent::HeadlightFull));
        assert_eq!(headlight_step(HEADLIGHT_FULL, false), None);
    }

    #[test]
    fn test_headlight_dim_only_sequence() {
        assert_eq!(headlight_step(HEADLIGHT_FULL, true), Some(CarEvent::HeadlightDim));
        assert_eq!(headlight_step(HEADLIGHT_DIM, true), Some(CarEvent::HeadlightOff));
        assert_eq!(headlight_step(HEADLIGHT_OFF, true), None);
    }

    #[test]
    fn test_tables_are_distinct() {
        // From the middle position the two tables diverge.
        assert_ne!(
            headlight_step(HEADLIGHT_DIM, false),
            headlight_step(HEADLIGHT_DIM, true)
        );
    }
}
