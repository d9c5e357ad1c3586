//! Generic Car Record
//!
//! One vehicle in the consist. Every car has mass, Davis-form rolling
//! resistance and a brake system; a driveable car additionally carries a
//! [`LocomotiveControls`] component. Composition replaces the classic
//! locomotive/wagon/car inheritance chain: capability is a presence check on
//! the component.

use crate::sim::brakes::{BrakeSystem, FULL_SERVICE_CYLINDER_PSI};
use crate::sim::locomotive::{LocomotiveControls, TickContext};

/// One car of a train.
pub struct Car {
    /// Vehicle mass, kg.
    pub mass_kg: f32,
    /// Davis constant term, N.
    pub davis_a_n: f32,
    /// Davis linear term, N per m/s.
    pub davis_b_n_per_mps: f32,
    /// Davis quadratic (aerodynamic) term, N per (m/s)².
    pub davis_c_n_per_mps2: f32,
    /// Retarding force at full service cylinder pressure, N.
    pub max_brake_force_n: f32,

    /// Motive force produced this tick, N. Zero for unpowered cars.
    pub motive_force_n: f32,
    /// Resistance force this tick (rolling + brake retardation), N.
    pub friction_force_n: f32,

    /// This car's pneumatic subsystem.
    pub brakes: Box<dyn BrakeSystem>,
    /// Control component; present only on driveable stock.
    pub locomotive: Option<LocomotiveControls>,
}

impl Car {
    /// Create an unpowered car with the given mass and brake equipment.
    pub fn new(mass_kg: f32, brakes: Box<dyn BrakeSystem>) -> Self {
        Self {
            mass_kg,
            davis_a_n: 0.0,
            davis_b_n_per_mps: 0.0,
            davis_c_n_per_mps2: 0.0,
            max_brake_force_n: 0.0,
            motive_force_n: 0.0,
            friction_force_n: 0.0,
            brakes,
            locomotive: None,
        }
    }

    /// Whether this car can be driven.
    #[inline]
    pub fn is_driveable(&self) -> bool {
        self.locomotive.is_some()
    }

    /// Per-tick force computation: Davis resistance plus brake retardation
    /// into `friction_force_n`, traction into `motive_force_n`.
    pub fn update(&mut self, ctx: &TickContext) {
        let speed = ctx.train_speed_mps.abs();
        let rolling = self.davis_a_n
            + self.davis_b_n_per_mps * speed
            + self.davis_c_n_per_mps2 * speed * speed;
        let applied = (self.brakes.cylinder_pressure_psi() / FULL_SERVICE_CYLINDER_PSI).min(1.0);
        self.friction_force_n = rolling + self.max_brake_force_n * applied;

        self.motive_force_n = match self.locomotive.as_mut() {
            Some(loco) => loco.update(ctx),
            None => 0.0,
        };
    }
}
