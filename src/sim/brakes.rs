//! Brake System Interface
//!
//! The pneumatic simulation proper is a collaborator of this core: the
//! locomotive reads pressures and status strings from it and advances it
//! once per tick, but never reaches into another car's brakes except for the
//! read-only rear-car status lookup.
//!
//! Display formatting differs by equipment: systems commanded through an
//! equalizing reservoir advertise that through a capability flag instead of
//! the caller inspecting the concrete type.

/// Brake pipe pressure of a fully charged system, PSI.
pub const CHARGED_PIPE_PSI: f32 = 90.0;

/// Brake cylinder pressure at full service application, PSI.
pub const FULL_SERVICE_CYLINDER_PSI: f32 = 64.0;

/// Cylinder pressure developed per PSI of pipe reduction.
const SERVICE_RATIO: f32 = 2.5;

/// Pneumatic subsystem of one car.
pub trait BrakeSystem {
    /// Status string for cab displays. `detailed` selects the full readout;
    /// the brief form is what a rear-of-train lookup shows.
    fn status(&self, detailed: bool) -> String;

    /// Whether this equipment is commanded through an equalizing reservoir,
    /// so displays should label the train pipe readout `EQ`.
    fn supports_equalizing_res_display(&self) -> bool;

    /// Current brake pipe pressure at this car, PSI.
    fn pipe_pressure_psi(&self) -> f32;

    /// Current brake cylinder pressure, PSI.
    fn cylinder_pressure_psi(&self) -> f32;

    /// Advance the pneumatics one tick toward the train pipe pressure.
    fn advance(&mut self, elapsed_seconds: f32, train_pipe_psi: f32);
}

/// Single-pipe automatic air brake.
///
/// The pipe at each car chases the train-level pressure at a finite
/// propagation rate, so cars far from the lead locomotive apply and release
/// late. Cylinder pressure develops in proportion to the pipe reduction.
#[derive(Clone, Debug)]
pub struct AirSinglePipe {
    pipe_pressure_psi: f32,
    cylinder_pressure_psi: f32,
    propagation_rate_psi_per_s: f32,
}

impl AirSinglePipe {
    /// Create a charged system. The propagation rate models distance from
    /// the lead car: smaller is slower.
    pub fn new(propagation_rate_psi_per_s: f32) -> Self {
        Self {
            pipe_pressure_psi: CHARGED_PIPE_PSI,
            cylinder_pressure_psi: 0.0,
            propagation_rate_psi_per_s,
        }
    }
}

impl BrakeSystem for AirSinglePipe {
    fn status(&self, detailed: bool) -> String {
        if detailed {
            format!(
                "BP {:.0} BC {:.0}",
                self.pipe_pressure_psi, self.cylinder_pressure_psi
            )
        } else {
            format!("BP {:.0}", self.pipe_pressure_psi)
        }
    }

    fn supports_equalizing_res_display(&self) -> bool {
        true
    }

    fn pipe_pressure_psi(&self) -> f32 {
        self.pipe_pressure_psi
    }

    fn cylinder_pressure_psi(&self) -> f32 {
        self.cylinder_pressure_psi
    }

    fn advance(&mut self, elapsed_seconds: f32, train_pipe_psi: f32) {
        let max_change = self.propagation_rate_psi_per_s * elapsed_seconds;
        let delta = (train_pipe_psi - self.pipe_pressure_psi).clamp(-max_change, max_change);
        self.pipe_pressure_psi += delta;

        let target = ((CHARGED_PIPE_PSI - self.pipe_pressure_psi) * SERVICE_RATIO)
            .clamp(0.0, FULL_SERVICE_CYLINDER_PSI);
        let cyl_change = self.propagation_rate_psi_per_s * elapsed_seconds;
        self.cylinder_pressure_psi +=
            (target - self.cylinder_pressure_psi).clamp(-cyl_change, cyl_change);
    }
}

/// Straight air brake: the cylinder is fed directly from the pipe with no
/// equalizing reservoir, as on some switchers and older stock.
#[derive(Clone, Debug, Default)]
pub struct StraightAirBrake {
    cylinder_pressure_psi: f32,
}

impl BrakeSystem for StraightAirBrake {
    fn status(&self, _detailed: bool) -> String {
        format!("BC {:.0}", self.cylinder_pressure_psi)
    }

    fn supports_equalizing_res_display(&self) -> bool {
        false
    }

    fn pipe_pressure_psi(&self) -> f32 {
        CHARGED_PIPE_PSI - self.cylinder_pressure_psi / SERVICE_RATIO
    }

    fn cylinder_pressure_psi(&self) -> f32 {
        self.cylinder_pressure_psi
    }

    fn advance(&mut self, _elapsed_seconds: f32, train_pipe_psi: f32) {
        self.cylinder_pressure_psi = ((CHARGED_PIPE_PSI - train_pipe_psi) * SERVICE_RATIO)
            .clamp(0.0, FULL_SERVICE_CYLINDER_PSI);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charged_system_is_released() {
        let brakes = AirSinglePipe::new(21.0);
        assert_eq!(brakes.pipe_pressure_psi(), CHARGED_PIPE_PSI);
        assert_eq!(brakes.cylinder_pressure_psi(), 0.0);
        assert_eq!(brakes.status(true), "BP 90 BC 0");
        assert_eq!(brakes.status(false), "BP 90");
    }

    #[test]
    fn test_pipe_chases_train_pressure() {
        let mut brakes = AirSinglePipe::new(10.0);
        brakes.advance(1.0, 70.0);
        assert_eq!(brakes.pipe_pressure_psi(), 80.0);
        brakes.advance(1.0, 70.0);
        assert_eq!(brakes.pipe_pressure_psi(), 70.0);
        // Settled: no overshoot past the target.
        brakes.advance(1.0, 70.0);
        assert_eq!(brakes.pipe_pressure_psi(), 70.0);
    }

    #[test]
    fn test_cylinder_develops_from_reduction() {
        let mut brakes = AirSinglePipe::new(1000.0);
        brakes.advance(1.0, 80.0);
        // 10 psi reduction -> 25 psi cylinder.
        assert!((brakes.cylinder_pressure_psi() - 25.0).abs() < 1e-3);

        // A full reduction saturates at full service.
        brakes.advance(10.0, 0.0);
        assert_eq!(brakes.cylinder_pressure_psi(), FULL_SERVICE_CYLINDER_PSI);
    }

    #[test]
    fn test_capability_flags() {
        assert!(AirSinglePipe::new(21.0).supports_equalizing_res_display());
        assert!(!StraightAirBrake::default().supports_equalizing_res_display());
    }

    #[test]
    fn test_straight_air_follows_pipe_directly() {
        let mut brakes = StraightAirBrake::default();
        brakes.advance(0.1, 80.0);
        assert!((brakes.cylinder_pressure_psi() - 25.0).abs() < 1e-3);
        brakes.advance(0.1, CHARGED_PIPE_PSI);
        assert_eq!(brakes.cylinder_pressure_psi(), 0.0);
    }
}
