//! Train Coordinator
//!
//! Owns the consist and every train-wide multiple-unit value: the reverser
//! signal, the AI brake percentage and the brake pipe (equalizing reservoir)
//! pressure. Cars never write these directly; cab commands that need a
//! train-wide effect return a [`MuCommand`] which only the coordinator
//! applies.
//!
//! Tick ordering: all of a frame's commands and events are synchronous and
//! applied before [`Train::update`] runs, so the physics always sees the
//! current frame's throttle and direction.

use serde::{Deserialize, Serialize};

use crate::core::hash::{compute_state_hash, StateHash};
use crate::sim::brakes::CHARGED_PIPE_PSI;
use crate::sim::car::Car;
use crate::sim::controller::EngineController;
use crate::sim::events::{headlight_step, CarEvent};
use crate::sim::locomotive::{Direction, LocomotiveControls, TickContext};

/// Train-wide control message emitted by a car and consumed by the
/// coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MuCommand {
    /// Set the consist reverser signal (+100 forward, -100 reverse).
    SetReverser(f32),
    /// Adjust the AI train brake percentage by a delta.
    AdjustAiBrake(f32),
    /// Set the AI train brake percentage outright.
    SetAiBrake(f32),
}

/// A cab event recorded for train-level consumers (sound, animation).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainEvent {
    /// Index of the car that raised the event.
    pub car: usize,
    /// The event itself.
    pub event: CarEvent,
}

/// A consist and its train-wide control state.
pub struct Train {
    /// Cars in consist order; index 0 is the head end.
    pub cars: Vec<Car>,
    /// Signed train speed, m/s.
    pub speed_mps: f32,

    mu_reverser_percent: f32,
    ai_brake_percent: f32,
    brake_pipe_pressure_psi: f32,
    pipe_charging_rate_psi_per_s: f32,

    pending_events: Vec<TrainEvent>,
}

impl Train {
    /// Create an empty train. The brake pipe charging rate is the injected
    /// system-wide configuration value passed down to every tick.
    pub fn new(pipe_charging_rate_psi_per_s: f32) -> Self {
        Self {
            cars: Vec::new(),
            speed_mps: 0.0,
            mu_reverser_percent: 0.0,
            ai_brake_percent: 0.0,
            brake_pipe_pressure_psi: CHARGED_PIPE_PSI,
            pipe_charging_rate_psi_per_s,
            pending_events: Vec::new(),
        }
    }

    /// Append a car to the consist.
    pub fn add_car(&mut self, car: Car) {
        self.cars.push(car);
    }

    /// Current consist reverser signal.
    #[inline]
    pub fn mu_reverser_percent(&self) -> f32 {
        self.mu_reverser_percent
    }

    /// Current AI train brake percentage.
    #[inline]
    pub fn ai_train_brake_percent(&self) -> f32 {
        self.ai_brake_percent
    }

    /// Current brake pipe / equalizing reservoir pressure, PSI.
    #[inline]
    pub fn brake_pipe_pressure_psi(&self) -> f32 {
        self.brake_pipe_pressure_psi
    }

    pub(crate) fn set_persisted_mu_state(
        &mut self,
        speed_mps: f32,
        mu_reverser_percent: f32,
        ai_brake_percent: f32,
        brake_pipe_pressure_psi: f32,
    ) {
        self.speed_mps = speed_mps;
        self.mu_reverser_percent = mu_reverser_percent;
        self.ai_brake_percent = ai_brake_percent;
        self.brake_pipe_pressure_psi = brake_pipe_pressure_psi;
    }

    // -------------------------------------------------------------------
    // Command surface (consumed by the input/AI layer)
    // -------------------------------------------------------------------

    /// Change the reverser on a driveable car. Rejected under power; on
    /// success the reverser signal propagates to the consist and a
    /// Forward/Reverse event fires.
    pub fn set_direction(&mut self, car_index: usize, direction: Direction) {
        let Some(cmd) = self.with_loco(car_index, |loco| loco.set_direction(direction)) else {
            return;
        };
        self.apply_mu(cmd);
        let event = match direction {
            Direction::Forward => Some(CarEvent::Forward),
            Direction::Reverse => Some(CarEvent::Reverse),
            Direction::Neutral => None,
        };
        if let Some(event) = event {
            self.signal_event(car_index, event);
        }
    }

    /// Advance the throttle one step on a driveable car.
    pub fn increase_throttle(&mut self, car_index: usize, elapsed_seconds: f32) {
        self.with_loco(car_index, |loco| {
            loco.increase_throttle(elapsed_seconds);
            None::<MuCommand>
        });
    }

    /// Reduce the throttle one step on a driveable car.
    pub fn decrease_throttle(&mut self, car_index: usize, elapsed_seconds: f32) {
        self.with_loco(car_index, |loco| {
            loco.decrease_throttle(elapsed_seconds);
            None::<MuCommand>
        });
    }

    /// Apply or release the train brake from a driveable car. Cars without
    /// a lever redirect to the AI brake percentage, clamped to [0, 100].
    pub fn change_train_brakes(&mut self, car_index: usize, percent: f32, elapsed_seconds: f32) {
        if let Some(cmd) =
            self.with_loco(car_index, |loco| loco.change_train_brakes(percent, elapsed_seconds))
        {
            self.apply_mu(cmd);
        }
    }

    /// Apply or release the engine brake on a driveable car.
    pub fn change_engine_brakes(&mut self, car_index: usize, percent: f32, elapsed_seconds: f32) {
        self.with_loco(car_index, |loco| {
            loco.change_engine_brakes(percent, elapsed_seconds);
            None::<MuCommand>
        });
    }

    /// Emergency brake application from a driveable car.
    pub fn set_emergency(&mut self, car_index: usize) {
        if let Some(cmd) = self.with_loco(car_index, |loco| loco.set_emergency()) {
            self.apply_mu(cmd);
        }
    }

    /// Toggle engine brake bail-off on a driveable car.
    pub fn toggle_bail_off(&mut self, car_index: usize) {
        self.with_loco(car_index, |loco| {
            loco.toggle_bail_off();
            None::<MuCommand>
        });
    }

    /// Step the headlight on a driveable car, using the plain or dim-only
    /// transition table, and dispatch the resulting event.
    pub fn step_headlight(&mut self, car_index: usize, dim_only: bool) {
        let Some(current) = self
            .cars
            .get(car_index)
            .and_then(|car| car.locomotive.as_ref())
            .map(|loco| loco.headlight)
        else {
            return;
        };
        if let Some(event) = headlight_step(current, dim_only) {
            self.signal_event(car_index, event);
        }
    }

    /// Dispatch a discrete event to a car and record it for train-level
    /// consumers. Events on cars without a locomotive component are
    /// recorded only.
    pub fn signal_event(&mut self, car_index: usize, event: CarEvent) {
        let Some(car) = self.cars.get_mut(car_index) else {
            return;
        };
        if let Some(loco) = car.locomotive.as_mut() {
            loco.signal_event(event);
        }
        self.pending_events.push(TrainEvent { car: car_index, event });
    }

    /// Take the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<TrainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // -------------------------------------------------------------------
    // Tick update
    // -------------------------------------------------------------------

    /// Run one simulation tick: move the brake pipe toward the commanded
    /// pressure, advance each car's pneumatics and forces, then integrate
    /// the train speed from the force balance.
    pub fn update(&mut self, elapsed_seconds: f32) {
        let target = CHARGED_PIPE_PSI * (1.0 - self.brake_application_fraction());
        let max_change = self.pipe_charging_rate_psi_per_s * elapsed_seconds;
        self.brake_pipe_pressure_psi +=
            (target - self.brake_pipe_pressure_psi).clamp(-max_change, max_change);

        let ctx = TickContext {
            elapsed_seconds,
            train_speed_mps: self.speed_mps,
            pipe_charging_rate_psi_per_s: self.pipe_charging_rate_psi_per_s,
        };
        for car in &mut self.cars {
            car.brakes.advance(elapsed_seconds, self.brake_pipe_pressure_psi);
            car.update(&ctx);
        }

        self.integrate_speed(elapsed_seconds);
    }

    /// Commanded brake application as a fraction: the lead driveable car's
    /// lever position, or the AI percentage when no lever is fitted.
    fn brake_application_fraction(&self) -> f32 {
        for car in &self.cars {
            if let Some(loco) = car.locomotive.as_ref() {
                if let Some(fraction) = loco.train_brake_fraction() {
                    return fraction;
                }
                break;
            }
        }
        self.ai_brake_percent / 100.0
    }

    fn integrate_speed(&mut self, elapsed_seconds: f32) {
        let total_mass: f32 = self.cars.iter().map(|car| car.mass_kg).sum();
        if total_mass <= 0.0 {
            return;
        }
        let traction: f32 = self.cars.iter().map(|car| car.motive_force_n).sum();
        let resistance: f32 = self.cars.iter().map(|car| car.friction_force_n).sum();

        if self.speed_mps == 0.0 {
            // Resistance holds the train until traction overcomes it.
            if traction.abs() <= resistance {
                return;
            }
            let net = traction - traction.signum() * resistance;
            self.speed_mps += net / total_mass * elapsed_seconds;
            return;
        }

        let net = traction - self.speed_mps.signum() * resistance;
        let new_speed = self.speed_mps + net / total_mass * elapsed_seconds;
        // Resistance alone stops the train; it never reverses it.
        if new_speed * self.speed_mps < 0.0 && traction.abs() <= resistance {
            self.speed_mps = 0.0;
        } else {
            self.speed_mps = new_speed;
        }
    }

    // -------------------------------------------------------------------
    // Status queries (consumed by the display layer)
    // -------------------------------------------------------------------

    /// Composed train brake readout for a car: lever status, train pipe
    /// pressure (labelled `EQ` when the equipment is commanded through an
    /// equalizing reservoir), the local brake status, and, from any car
    /// but the rear one, the rear car's own brake status, surfacing
    /// brake pipe lag at the end of the train.
    pub fn train_brake_status(&self, car_index: usize) -> String {
        let Some(car) = self.cars.get(car_index) else {
            return String::new();
        };
        let controller = car
            .locomotive
            .as_ref()
            .and_then(|loco| loco.train_brake_controller.as_ref());
        let Some(controller) = controller else {
            return car.brakes.status(true);
        };

        let mut s = controller.status();
        if car.brakes.supports_equalizing_res_display() {
            s.push_str(&format!(" EQ {:.0} ", self.brake_pipe_pressure_psi));
        } else {
            s.push_str(&format!(" {:.0} ", self.brake_pipe_pressure_psi));
        }
        s.push_str(&car.brakes.status(true));

        let mut rear_index = self.cars.len() - 1;
        if rear_index == car_index {
            rear_index = 0;
        }
        if rear_index != car_index {
            s.push(' ');
            s.push_str(&self.cars[rear_index].brakes.status(false));
        }
        s
    }

    /// Engine brake readout for a car, or `None` when the car has no
    /// engine brake lever.
    pub fn engine_brake_status(&self, car_index: usize) -> Option<String> {
        self.cars
            .get(car_index)?
            .locomotive
            .as_ref()?
            .engine_brake_status()
    }

    // -------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------

    /// Hash the persistable simulation state. Derived per-tick values
    /// (forces, cab indicators) and the momentary horn flag are excluded,
    /// so a saved and restored train hashes identically.
    pub fn state_hash(&self) -> StateHash {
        compute_state_hash(self.cars.len() as u32, |h| {
            h.update_f32(self.speed_mps);
            h.update_f32(self.mu_reverser_percent);
            h.update_f32(self.ai_brake_percent);
            h.update_f32(self.brake_pipe_pressure_psi);
            for car in &self.cars {
                h.update_f32(car.mass_kg);
                h.update_f32(car.davis_a_n);
                h.update_f32(car.davis_b_n_per_mps);
                h.update_f32(car.davis_c_n_per_mps2);
                h.update_f32(car.max_brake_force_n);
                h.update_bool(car.locomotive.is_some());
                if let Some(loco) = car.locomotive.as_ref() {
                    hash_locomotive(h, loco);
                }
            }
        })
    }

    fn with_loco<R>(
        &mut self,
        car_index: usize,
        f: impl FnOnce(&mut LocomotiveControls) -> Option<R>,
    ) -> Option<R> {
        let loco = self.cars.get_mut(car_index)?.locomotive.as_mut()?;
        f(loco)
    }

    fn apply_mu(&mut self, cmd: MuCommand) {
        match cmd {
            MuCommand::SetReverser(percent) => self.mu_reverser_percent = percent,
            MuCommand::AdjustAiBrake(delta) => {
                self.ai_brake_percent = (self.ai_brake_percent + delta).clamp(0.0, 100.0);
            }
            MuCommand::SetAiBrake(percent) => {
                self.ai_brake_percent = percent.clamp(0.0, 100.0);
            }
        }
    }
}

fn hash_locomotive(h: &mut crate::core::hash::StateHasher, loco: &LocomotiveControls) {
    h.update_f32(loco.throttle_percent);
    h.update_u8(match loco.direction {
        Direction::Forward => 1,
        Direction::Neutral => 0,
        Direction::Reverse => 2,
    });
    h.update_f32(loco.max_power_w);
    h.update_f32(loco.max_force_n);
    h.update_f32(loco.max_speed_mps);
    h.update_f32(loco.main_res_pressure_psi);
    h.update_f32(loco.max_main_res_pressure_psi);
    h.update_f32(loco.compressor_restart_pressure_psi);
    h.update_f32(loco.main_res_volume_ft3);
    h.update_bool(loco.compressor_on);
    h.update_bool(loco.bell);
    h.update_bool(loco.sander);
    h.update_bool(loco.wiper);
    h.update_bool(loco.bail_off);
    h.update_u8(loco.headlight);
    for controller in [
        loco.throttle_controller.as_ref(),
        loco.train_brake_controller.as_ref(),
        loco.engine_brake_controller.as_ref(),
    ] {
        hash_controller(h, controller);
    }
}

fn hash_controller(h: &mut crate::core::hash::StateHasher, ctrl: Option<&EngineController>) {
    h.update_bool(ctrl.is_some());
    if let Some(ctrl) = ctrl {
        h.update_f32(ctrl.position());
        h.update_f32(ctrl.step_size());
        h.update_bool(ctrl.is_emergency());
        h.update_u32(ctrl.notches().len() as u32);
        for notch in ctrl.notches() {
            h.update_f32(*notch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::brakes::{AirSinglePipe, StraightAirBrake};

    const DT: f32 = 0.1;
    const CHARGING_RATE: f32 = 21.0;

    fn locomotive_car(with_train_brake: bool) -> Car {
        let mut loco = LocomotiveControls::new(2_000_000.0, 300_000.0, 40.0);
        loco.throttle_controller =
            EngineController::new(0.1, 0.0, None, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        if with_train_brake {
            loco.train_brake_controller =
                EngineController::new(0.2, 0.0, None, vec![0.0, 0.5, 1.0]);
        }
        let mut car = Car::new(120_000.0, Box::new(AirSinglePipe::new(30.0)));
        car.davis_a_n = 1200.0;
        car.davis_b_n_per_mps = 60.0;
        car.davis_c_n_per_mps2 = 10.0;
        car.max_brake_force_n = 90_000.0;
        car.locomotive = Some(loco);
        car
    }

    fn wagon_car(propagation: f32) -> Car {
        let mut car = Car::new(40_000.0, Box::new(AirSinglePipe::new(propagation)));
        car.davis_a_n = 600.0;
        car.davis_b_n_per_mps = 30.0;
        car.davis_c_n_per_mps2 = 4.0;
        car.max_brake_force_n = 60_000.0;
        car
    }

    fn three_car_train(with_train_brake: bool) -> Train {
        let mut train = Train::new(CHARGING_RATE);
        train.add_car(locomotive_car(with_train_brake));
        train.add_car(wagon_car(20.0));
        train.add_car(wagon_car(10.0));
        train
    }

    #[test]
    fn test_ai_brake_fallback_adjusts_and_clamps() {
        let mut train = three_car_train(false);

        train.change_train_brakes(0, 10.0, DT);
        assert_eq!(train.ai_train_brake_percent(), 10.0);

        for _ in 0..20 {
            train.change_train_brakes(0, 10.0, DT);
        }
        assert_eq!(train.ai_train_brake_percent(), 100.0);

        for _ in 0..30 {
            train.change_train_brakes(0, -10.0, DT);
        }
        assert_eq!(train.ai_train_brake_percent(), 0.0);
    }

    #[test]
    fn test_emergency_without_lever_sets_full_ai_brake() {
        let mut train = three_car_train(false);
        train.set_emergency(0);
        assert_eq!(train.ai_train_brake_percent(), 100.0);
    }

    #[test]
    fn test_lever_commands_do_not_touch_ai_brake() {
        let mut train = three_car_train(true);
        train.change_train_brakes(0, 10.0, DT);
        assert_eq!(train.ai_train_brake_percent(), 0.0);
    }

    #[test]
    fn test_reverser_signal_propagation() {
        let mut train = three_car_train(true);

        train.set_direction(0, Direction::Forward);
        assert_eq!(train.mu_reverser_percent(), 100.0);
        let events = train.take_events();
        assert!(events.contains(&TrainEvent { car: 0, event: CarEvent::Forward }));

        train.set_direction(0, Direction::Reverse);
        assert_eq!(train.mu_reverser_percent(), -100.0);
    }

    #[test]
    fn test_direction_change_rejected_under_power() {
        let mut train = three_car_train(true);
        train.set_direction(0, Direction::Forward);
        train.increase_throttle(0, DT);
        train.take_events();

        train.set_direction(0, Direction::Reverse);
        assert_eq!(train.mu_reverser_percent(), 100.0);
        assert!(train.take_events().is_empty());
    }

    #[test]
    fn test_commands_on_unpowered_cars_are_ignored() {
        let mut train = three_car_train(true);
        train.increase_throttle(1, DT);
        train.set_direction(1, Direction::Forward);
        train.set_emergency(99);
        assert_eq!(train.mu_reverser_percent(), 0.0);
        assert_eq!(train.ai_train_brake_percent(), 0.0);
    }

    #[test]
    fn test_train_accelerates_under_power() {
        let mut train = three_car_train(true);
        train.set_direction(0, Direction::Forward);
        for _ in 0..4 {
            train.increase_throttle(0, DT);
        }

        for _ in 0..100 {
            train.update(DT);
        }
        assert!(train.speed_mps > 1.0);
    }

    #[test]
    fn test_resistance_stops_but_never_reverses() {
        let mut train = three_car_train(true);
        train.speed_mps = 0.5;

        // Coasting with no traction: the train slows to a stop and stays
        // there.
        for _ in 0..10_000 {
            train.update(DT);
        }
        assert_eq!(train.speed_mps, 0.0);
    }

    #[test]
    fn test_brake_application_slows_train() {
        let mut train = three_car_train(true);
        train.speed_mps = 20.0;
        train.change_train_brakes(0, 10.0, DT);
        train.change_train_brakes(0, 10.0, DT);

        let coasting = {
            let mut t = three_car_train(true);
            t.speed_mps = 20.0;
            for _ in 0..200 {
                t.update(DT);
            }
            t.speed_mps
        };
        for _ in 0..200 {
            train.update(DT);
        }
        assert!(train.speed_mps < coasting);
    }

    #[test]
    fn test_rear_car_pipe_lags_head_car() {
        let mut train = three_car_train(true);
        train.change_train_brakes(0, 10.0, DT);
        train.change_train_brakes(0, 10.0, DT);

        for _ in 0..10 {
            train.update(DT);
        }
        let head = train.cars[0].brakes.pipe_pressure_psi();
        let rear = train.cars[2].brakes.pipe_pressure_psi();
        assert!(rear > head, "rear pipe should trail the head: {rear} vs {head}");
    }

    #[test]
    fn test_train_brake_status_composition() {
        let mut train = three_car_train(true);
        train.update(DT);

        let status = train.train_brake_status(0);
        assert!(status.starts_with("Notch 0"));
        assert!(status.contains(" EQ 90 "));
        // Rear car readout is appended in brief form.
        assert!(status.ends_with("BP 90"));
    }

    #[test]
    fn test_train_brake_status_without_lever_is_local_readout() {
        let train = three_car_train(false);
        assert_eq!(train.train_brake_status(0), "BP 90 BC 0");
    }

    #[test]
    fn test_train_brake_status_without_equalizing_display() {
        let mut train = Train::new(CHARGING_RATE);
        let mut car = locomotive_car(true);
        car.brakes = Box::new(StraightAirBrake::default());
        train.add_car(car);
        train.add_car(wagon_car(20.0));

        let status = train.train_brake_status(0);
        assert!(!status.contains("EQ"));
        assert!(status.contains(" 90 "));
    }

    #[test]
    fn test_rear_car_status_falls_back_to_head() {
        // When the rear car itself asks, the head car's brakes are shown.
        let mut train = Train::new(CHARGING_RATE);
        train.add_car(wagon_car(20.0));
        train.add_car(locomotive_car(true));

        let status = train.train_brake_status(1);
        assert!(status.ends_with("BP 90"));
    }

    #[test]
    fn test_engine_brake_status_query() {
        let mut train = three_car_train(true);
        assert_eq!(train.engine_brake_status(0), None);
        assert_eq!(train.engine_brake_status(1), None);

        let loco = train.cars[0].locomotive.as_mut().unwrap();
        loco.engine_brake_controller =
            EngineController::new(0.5, 0.0, None, vec![0.0, 0.5, 1.0]);
        assert_eq!(train.engine_brake_status(0).as_deref(), Some("Notch 0"));
    }

    #[test]
    fn test_state_hash_tracks_driving() {
        let drive = || {
            let mut train = three_car_train(true);
            train.set_direction(0, Direction::Forward);
            train.increase_throttle(0, DT);
            for _ in 0..50 {
                train.update(DT);
            }
            train
        };

        assert_eq!(drive().state_hash(), drive().state_hash());

        let mut other = drive();
        other.increase_throttle(0, DT);
        other.update(DT);
        assert_ne!(drive().state_hash(), other.state_hash());
    }

    #[test]
    fn test_fuzzed_driving_is_deterministic() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let drive = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut train = three_car_train(true);
            for _ in 0..500 {
                match rng.gen_range(0..8) {
                    0 => train.increase_throttle(0, DT),
                    1 => train.decrease_throttle(0, DT),
                    2 => train.change_train_brakes(0, 10.0, DT),
                    3 => train.change_train_brakes(0, -10.0, DT),
                    4 => train.set_direction(0, Direction::Forward),
                    5 => train.set_direction(0, Direction::Reverse),
                    6 => train.signal_event(0, CarEvent::SanderOn),
                    _ => train.update(DT),
                }
            }
            train.update(DT);
            train.state_hash()
        };

        assert_eq!(drive(7), drive(7));
        assert_ne!(drive(7), drive(8));
    }

    #[test]
    fn test_take_events_drains() {
        let mut train = three_car_train(true);
        train.signal_event(0, CarEvent::BellOn);
        train.signal_event(2, CarEvent::WiperOn);

        let events = train.take_events();
        assert_eq!(events.len(), 2);
        assert!(train.take_events().is_empty());
    }

    #[test]
    fn test_headlight_step_command() {
        let mut train = three_car_train(true);
        train.step_headlight(0, false);
        assert_eq!(train.cars[0].locomotive.as_ref().unwrap().headlight, 1);
        train.step_headlight(0, false);
        assert_eq!(train.cars[0].locomotive.as_ref().unwrap().headlight, 2);
        // Clamped at full beam.
        train.step_headlight(0, false);
        assert_eq!(train.cars[0].locomotive.as_ref().unwrap().headlight, 2);

        train.step_headlight(0, true);
        assert_eq!(train.cars[0].locomotive.as_ref().unwrap().headlight, 1);
    }
}
