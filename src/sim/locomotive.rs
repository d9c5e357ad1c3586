//! Locomotive Control State and Tick Update
//!
//! `LocomotiveControls` is the cab-and-traction component a driveable car
//! carries: throttle and brake levers, reverser, compressor and main
//! reservoir, and the discrete cab flags. Its per-tick update turns the
//! current control state into a motive force for the train dynamics layer.
//!
//! Commands that affect train-wide multiple-unit state do not mutate it
//! here; they return a [`MuCommand`] for the train coordinator, which owns
//! that state exclusively.

use serde::{Deserialize, Serialize};

use crate::sim::controller::EngineController;
use crate::sim::events::{CarEvent, HEADLIGHT_DIM, HEADLIGHT_FULL, HEADLIGHT_OFF};
use crate::sim::train::MuCommand;

/// Throttle step applied per command when no throttle controller is fitted.
const THROTTLE_STEP_PERCENT: f32 = 10.0;

/// Reverser setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Traction applies forward
    Forward,
    /// No traction direction selected
    #[default]
    Neutral,
    /// Traction applies backward
    Reverse,
}

impl Direction {
    /// Sign of the motive force for this setting.
    #[inline]
    pub fn signum(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Neutral => 0.0,
            Direction::Reverse => -1.0,
        }
    }

    /// Multiple-unit reverser signal propagated to the consist.
    #[inline]
    pub fn reverser_percent(self) -> f32 {
        match self {
            Direction::Forward => 100.0,
            Direction::Neutral => 0.0,
            Direction::Reverse => -100.0,
        }
    }
}

/// Per-tick inputs supplied by the train coordinator.
///
/// The brake pipe charging rate is system-wide configuration injected here
/// each tick rather than read from any global.
#[derive(Clone, Copy, Debug)]
pub struct TickContext {
    /// Elapsed simulation time for this tick, seconds. Never negative.
    pub elapsed_seconds: f32,
    /// Signed train speed, m/s.
    pub train_speed_mps: f32,
    /// Brake pipe charging rate, PSI/s.
    pub pipe_charging_rate_psi_per_s: f32,
}

/// Control and traction state of one locomotive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocomotiveControls {
    /// Commanded throttle, 0–100.
    pub throttle_percent: f32,
    /// Reverser setting.
    pub direction: Direction,

    /// Rated power, W.
    pub max_power_w: f32,
    /// Rated tractive force, N.
    pub max_force_n: f32,
    /// Governed top speed, m/s.
    pub max_speed_mps: f32,

    /// Current main reservoir pressure, PSI.
    pub main_res_pressure_psi: f32,
    /// Compressor cut-out pressure, PSI.
    pub max_main_res_pressure_psi: f32,
    /// Compressor cut-in pressure, PSI.
    pub compressor_restart_pressure_psi: f32,
    /// Main reservoir capacity, ft³.
    pub main_res_volume_ft3: f32,
    /// Whether the compressor is currently running.
    pub compressor_on: bool,

    /// Horn flag. Momentary; never persisted.
    pub horn: bool,
    /// Bell flag.
    pub bell: bool,
    /// Sander flag.
    pub sander: bool,
    /// Wiper flag.
    pub wiper: bool,
    /// Engine brake bail-off flag.
    pub bail_off: bool,
    /// Headlight ordinal, 0–2.
    pub headlight: u8,

    /// Throttle lever, absent on some stock.
    pub throttle_controller: Option<EngineController>,
    /// Train (automatic) brake lever.
    pub train_brake_controller: Option<EngineController>,
    /// Independent engine brake lever.
    pub engine_brake_controller: Option<EngineController>,

    /// Normalized force readout for cab gauges: |motive| / rated force.
    pub force_indicator: f32,
    /// Normalized throttle readout for cab gauges.
    pub throttle_indicator: f32,
}

impl LocomotiveControls {
    /// Create a locomotive component with the given capability constants.
    /// Reservoir constants start at their conventional defaults until
    /// configuration overrides them.
    pub fn new(max_power_w: f32, max_force_n: f32, max_speed_mps: f32) -> Self {
        Self {
            throttle_percent: 0.0,
            direction: Direction::Neutral,
            max_power_w,
            max_force_n,
            max_speed_mps,
            main_res_pressure_psi: 130.0,
            max_main_res_pressure_psi: 130.0,
            compressor_restart_pressure_psi: 110.0,
            main_res_volume_ft3: 10.0,
            compressor_on: false,
            horn: false,
            bell: false,
            sander: false,
            wiper: false,
            bail_off: false,
            headlight: HEADLIGHT_OFF,
            throttle_controller: None,
            train_brake_controller: None,
            engine_brake_controller: None,
            force_indicator: 0.0,
            throttle_indicator: 0.0,
        }
    }

    /// Per-tick physics update. Returns the motive force in newtons.
    ///
    /// Traction follows the throttle-scaled force/power envelope: force is
    /// clamped to the power limit once moving, then rolled off linearly as
    /// the locomotive approaches the governed speed for the current throttle
    /// setting. The compressor runs on a two-threshold hysteresis so it
    /// never short-cycles at a single setpoint.
    pub fn update(&mut self, ctx: &TickContext) -> f32 {
        let t = self.throttle_percent / 100.0;
        let mut max_force = self.max_force_n * t;
        let max_power = self.max_power_w * t * t;
        let max_speed = self.max_speed_mps * t;
        let current_speed = ctx.train_speed_mps.abs();

        // Power-limited regime. At standstill no clamp applies.
        if current_speed > 0.0 && max_force * current_speed > max_power {
            max_force = max_power / current_speed;
        }

        let mut balance_ratio = 1.0;
        if max_speed > current_speed {
            balance_ratio = current_speed / max_speed;
        }

        let motive_force_n = self.direction.signum() * max_force * (1.0 - balance_ratio);

        self.force_indicator = if self.max_force_n > 0.0 {
            motive_force_n.abs() / self.max_force_n
        } else {
            0.0
        };
        self.throttle_indicator = t;

        if self.main_res_pressure_psi < self.compressor_restart_pressure_psi {
            self.compressor_on = true;
        } else if self.main_res_pressure_psi > self.max_main_res_pressure_psi {
            self.compressor_on = false;
        }
        if self.compressor_on {
            self.main_res_pressure_psi += ctx.elapsed_seconds * 0.5
                * ctx.pipe_charging_rate_psi_per_s
                * 0.5
                / self.main_res_volume_ft3;
        }

        motive_force_n
    }

    /// Change the reverser. Only permitted while the throttle is shut
    /// (below 1%) and the setting actually differs; otherwise the request
    /// is ignored. On success returns the reverser signal for the
    /// coordinator.
    pub fn set_direction(&mut self, direction: Direction) -> Option<MuCommand> {
        if self.direction == direction || self.throttle_percent >= 1.0 {
            return None;
        }
        self.direction = direction;
        Some(MuCommand::SetReverser(direction.reverser_percent()))
    }

    /// Advance the throttle: through the lever when fitted, else a fixed
    /// step.
    pub fn increase_throttle(&mut self, elapsed_seconds: f32) {
        match self.throttle_controller.as_mut() {
            Some(ctrl) => self.throttle_percent = ctrl.increase(elapsed_seconds) * 100.0,
            None => {
                self.throttle_percent =
                    (self.throttle_percent + THROTTLE_STEP_PERCENT).min(100.0);
            }
        }
    }

    /// Reduce the throttle: through the lever when fitted, else a fixed
    /// step.
    pub fn decrease_throttle(&mut self, elapsed_seconds: f32) {
        match self.throttle_controller.as_mut() {
            Some(ctrl) => self.throttle_percent = ctrl.decrease(elapsed_seconds) * 100.0,
            None => {
                self.throttle_percent =
                    (self.throttle_percent - THROTTLE_STEP_PERCENT).max(0.0);
            }
        }
    }

    /// Apply or release the train brake. The sign of `percent` selects the
    /// lever direction. Without a lever the request becomes an AI brake
    /// adjustment for the coordinator.
    pub fn change_train_brakes(&mut self, percent: f32, elapsed_seconds: f32) -> Option<MuCommand> {
        match self.train_brake_controller.as_mut() {
            Some(ctrl) => {
                if percent > 0.0 {
                    ctrl.increase(elapsed_seconds);
                } else {
                    ctrl.decrease(elapsed_seconds);
                }
                None
            }
            None => Some(MuCommand::AdjustAiBrake(percent)),
        }
    }

    /// Emergency application: snap the lever if fitted, else command full
    /// AI braking.
    pub fn set_emergency(&mut self) -> Option<MuCommand> {
        match self.train_brake_controller.as_mut() {
            Some(ctrl) => {
                ctrl.set_emergency();
                None
            }
            None => Some(MuCommand::SetAiBrake(100.0)),
        }
    }

    /// Apply or release the independent engine brake. A no-op when the
    /// lever is absent.
    pub fn change_engine_brakes(&mut self, percent: f32, elapsed_seconds: f32) {
        let Some(ctrl) = self.engine_brake_controller.as_mut() else {
            return;
        };
        if percent > 0.0 {
            ctrl.increase(elapsed_seconds);
        } else {
            ctrl.decrease(elapsed_seconds);
        }
    }

    /// Toggle the engine brake bail-off.
    pub fn toggle_bail_off(&mut self) {
        self.bail_off = !self.bail_off;
    }

    /// Apply a discrete cab event to the flags.
    ///
    /// Forward/Reverse carry no flag here; they are recorded for
    /// train-level consumers only.
    pub fn signal_event(&mut self, event: CarEvent) {
        match event {
            CarEvent::BellOn => self.bell = true,
            CarEvent::BellOff => self.bell = false,
            CarEvent::HornOn => self.horn = true,
            CarEvent::HornOff => self.horn = false,
            CarEvent::SanderOn => self.sander = true,
            CarEvent::SanderOff => self.sander = false,
            CarEvent::WiperOn => self.wiper = true,
            CarEvent::WiperOff => self.wiper = false,
            CarEvent::HeadlightOff => self.headlight = HEADLIGHT_OFF,
            CarEvent::HeadlightDim => self.headlight = HEADLIGHT_DIM,
            CarEvent::HeadlightFull => self.headlight = HEADLIGHT_FULL,
            CarEvent::Forward | CarEvent::Reverse => {}
        }
    }

    /// Engine brake readout, or `None` when no lever is fitted.
    pub fn engine_brake_status(&self) -> Option<String> {
        let ctrl = self.engine_brake_controller.as_ref()?;
        Some(format!(
            "{}{}",
            ctrl.status(),
            if self.bail_off { " BailOff" } else { "" }
        ))
    }

    /// Train brake lever position, if a lever is fitted.
    pub fn train_brake_fraction(&self) -> Option<f32> {
        self.train_brake_controller.as_ref().map(|c| c.position())
    }
}
