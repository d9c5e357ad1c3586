//! Cab Lever Controller
//!
//! Models a single operator control (throttle or brake lever) as a
//! steppable, notched scalar in [0, 1]. A controller is either discrete
//! (moves one step per command) or continuous (integrates a rate over the
//! elapsed time of the input frame).
//!
//! Absence is a first-class state: a definition with no usable step size or
//! no notches never becomes a controller at all, and the owning locomotive
//! falls back to its uncontrolled ramp.

use serde::{Deserialize, Serialize};

/// A notched cab lever with a position in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineController {
    /// Ordered notch positions, each in [0, 1].
    notches: Vec<f32>,
    /// Current lever position in [0, 1].
    position: f32,
    /// Per-command step for discrete movement. Always > 0 by construction.
    step_size: f32,
    /// Interpolation rate in position/second; `Some` makes the lever
    /// continuous.
    continuous_rate: Option<f32>,
    /// Set by `set_emergency`, cleared by any normal movement.
    emergency: bool,
}

impl EngineController {
    /// Build a controller from parsed configuration.
    ///
    /// Returns `None` for invalid definitions (non-positive step size or no
    /// notches); the caller treats those as "controller absent".
    pub fn new(
        step_size: f32,
        initial: f32,
        continuous_rate: Option<f32>,
        notches: Vec<f32>,
    ) -> Option<Self> {
        if step_size <= 0.0 || notches.is_empty() {
            return None;
        }
        Some(Self {
            notches,
            position: initial.clamp(0.0, 1.0),
            step_size,
            continuous_rate: continuous_rate.filter(|r| *r > 0.0),
            emergency: false,
        })
    }

    /// Current lever position as a fraction.
    #[inline]
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Step size for discrete movement.
    #[inline]
    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    /// Continuous interpolation rate, if configured.
    #[inline]
    pub fn continuous_rate(&self) -> Option<f32> {
        self.continuous_rate
    }

    /// Configured notch positions.
    #[inline]
    pub fn notches(&self) -> &[f32] {
        &self.notches
    }

    /// Whether the lever sits in the emergency position.
    #[inline]
    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Move the lever up: one step, or `rate * elapsed` when continuous.
    /// Returns the new position.
    pub fn increase(&mut self, elapsed_seconds: f32) -> f32 {
        self.apply(self.movement(elapsed_seconds))
    }

    /// Move the lever down: one step, or `rate * elapsed` when continuous.
    /// Returns the new position.
    pub fn decrease(&mut self, elapsed_seconds: f32) -> f32 {
        self.apply(-self.movement(elapsed_seconds))
    }

    /// Snap to the emergency position (full application), bypassing steps.
    pub fn set_emergency(&mut self) {
        self.position = 1.0;
        self.emergency = true;
    }

    /// Human-readable lever label for cab displays. No physics depends on
    /// this.
    pub fn status(&self) -> String {
        if self.emergency {
            return "Emergency".to_string();
        }
        if self.continuous_rate.is_some() {
            return format!("{:.0}%", self.position * 100.0);
        }
        format!("Notch {}", self.nearest_notch())
    }

    fn movement(&self, elapsed_seconds: f32) -> f32 {
        match self.continuous_rate {
            Some(rate) => rate * elapsed_seconds,
            None => self.step_size,
        }
    }

    fn apply(&mut self, delta: f32) -> f32 {
        // Any normal movement releases the emergency latch.
        self.emergency = false;
        self.position = (self.position + delta).clamp(0.0, 1.0);
        self.position
    }

    fn nearest_notch(&self) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, notch) in self.notches.iter().enumerate() {
            let dist = (self.position - notch).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }
}
