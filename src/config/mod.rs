//! Rolling-Stock Definition Parsing
//!
//! Definitions arrive as a nested token/value stream:
//!
//! ```text
//! wagon (
//!     mass ( 80t )
//!     davis_a ( 600 )
//! )
//! engine (
//!     maxpower ( 2000kW )
//!     enginecontrollers (
//!         throttle ( 0.1 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
//!     )
//! )
//! ```
//!
//! Keys are case-insensitive. Keys the engine parser does not recognize are
//! delegated to the wagon parser; keys neither recognizes are logged as a
//! warning and skipped, and malformed values keep their defaults: a bad
//! definition degrades, it does not abort the simulation. Only a
//! structurally broken stream (unbalanced blocks, truncation) fails the
//! parse.
//!
//! A parsed [`CarDefinition`] is cheap to clone and can build any number of
//! cars, so a consist of identical vehicles parses its definition once.

mod tokens;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::units;
use crate::sim::brakes::{AirSinglePipe, BrakeSystem, StraightAirBrake};
use crate::sim::car::Car;
use crate::sim::controller::EngineController;
use crate::sim::locomotive::LocomotiveControls;

use tokens::{Parser, Token};

/// Structural failure of a definition stream.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A key was not followed by an opening parenthesis.
    #[error("expected '(' after key '{0}'")]
    ExpectedBlock(String),
    /// A '(' appeared where a key was expected.
    #[error("unexpected '(' in definition")]
    UnexpectedOpen,
    /// A block was still open when the stream ended.
    #[error("unexpected end of definition")]
    UnexpectedEnd,
    /// A ')' with no matching '('.
    #[error("unbalanced ')' in definition")]
    UnbalancedClose,
}

/// Brake equipment fitted to a car.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrakeKind {
    /// Single-pipe automatic air brake.
    #[default]
    AirSinglePipe,
    /// Straight (direct) air brake.
    StraightAir,
}

/// Parsed lever definition. Built into an [`EngineController`] at
/// instantiation time; definitions with no usable step size or no notches
/// build to "absent".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Per-command step.
    pub step_size: f32,
    /// Initial lever position.
    pub initial: f32,
    /// Continuous interpolation rate, position/second.
    pub rate: Option<f32>,
    /// Notch positions.
    pub notches: Vec<f32>,
}

impl ControllerConfig {
    /// Instantiate, normalizing invalid definitions to absent.
    pub fn build(&self) -> Option<EngineController> {
        EngineController::new(self.step_size, self.initial, self.rate, self.notches.clone())
    }
}

/// Wagon-level (base car) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WagonConfig {
    /// Vehicle mass, kg.
    pub mass_kg: f32,
    /// Davis constant term, N.
    pub davis_a_n: f32,
    /// Davis linear term, N per m/s.
    pub davis_b_n_per_mps: f32,
    /// Davis quadratic term, N per (m/s)².
    pub davis_c_n_per_mps2: f32,
    /// Retarding force at full service application, N.
    pub max_brake_force_n: f32,
    /// Brake equipment.
    pub brake_system: BrakeKind,
}

impl Default for WagonConfig {
    fn default() -> Self {
        Self {
            mass_kg: 30_000.0,
            davis_a_n: 0.0,
            davis_b_n_per_mps: 0.0,
            davis_c_n_per_mps2: 0.0,
            max_brake_force_n: 0.0,
            brake_system: BrakeKind::default(),
        }
    }
}

/// Engine-level configuration for driveable stock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rated power, W.
    pub max_power_w: f32,
    /// Rated tractive force, N.
    pub max_force_n: f32,
    /// Governed top speed, m/s.
    pub max_speed_mps: f32,
    /// Main reservoir capacity, ft³.
    pub main_res_volume_ft3: f32,
    /// Compressor cut-out pressure, PSI.
    pub max_main_res_pressure_psi: f32,
    /// Compressor cut-in pressure, PSI.
    pub compressor_restart_pressure_psi: f32,
    /// Throttle lever definition.
    pub throttle: Option<ControllerConfig>,
    /// Train brake lever definition.
    pub train_brake: Option<ControllerConfig>,
    /// Engine brake lever definition.
    pub engine_brake: Option<ControllerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_power_w: 0.0,
            max_force_n: 0.0,
            max_speed_mps: 1000.0,
            main_res_volume_ft3: 10.0,
            max_main_res_pressure_psi: 130.0,
            compressor_restart_pressure_psi: 110.0,
            throttle: None,
            train_brake: None,
            engine_brake: None,
        }
    }
}

impl EngineConfig {
    /// Instantiate the control component for this definition.
    pub fn build_controls(&self) -> LocomotiveControls {
        let mut loco =
            LocomotiveControls::new(self.max_power_w, self.max_force_n, self.max_speed_mps);
        loco.main_res_volume_ft3 = self.main_res_volume_ft3;
        loco.max_main_res_pressure_psi = self.max_main_res_pressure_psi;
        loco.main_res_pressure_psi = self.max_main_res_pressure_psi;
        loco.compressor_restart_pressure_psi = self.compressor_restart_pressure_psi;
        loco.throttle_controller = self.throttle.as_ref().and_then(ControllerConfig::build);
        loco.train_brake_controller = self.train_brake.as_ref().and_then(ControllerConfig::build);
        loco.engine_brake_controller =
            self.engine_brake.as_ref().and_then(ControllerConfig::build);
        loco
    }
}

/// A fully parsed car definition: wagon data plus an optional engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CarDefinition {
    /// Base car configuration.
    pub wagon: WagonConfig,
    /// Engine configuration; `None` for unpowered stock.
    pub engine: Option<EngineConfig>,
}

impl CarDefinition {
    /// Instantiate a car from this definition.
    ///
    /// The brake propagation rate depends on the car's distance from the
    /// head end, so it is supplied per instantiation rather than parsed.
    pub fn build(&self, brake_propagation_rate_psi_per_s: f32) -> Car {
        let brakes: Box<dyn BrakeSystem> = match self.wagon.brake_system {
            BrakeKind::AirSinglePipe => {
                Box::new(AirSinglePipe::new(brake_propagation_rate_psi_per_s))
            }
            BrakeKind::StraightAir => Box::new(StraightAirBrake::default()),
        };
        let mut car = Car::new(self.wagon.mass_kg, brakes);
        car.davis_a_n = self.wagon.davis_a_n;
        car.davis_b_n_per_mps = self.wagon.davis_b_n_per_mps;
        car.davis_c_n_per_mps2 = self.wagon.davis_c_n_per_mps2;
        car.max_brake_force_n = self.wagon.max_brake_force_n;
        car.locomotive = self.engine.as_ref().map(EngineConfig::build_controls);
        car
    }
}

/// Parse a car definition from a token/value stream.
pub fn parse_definition(source: &str) -> Result<CarDefinition, ConfigError> {
    let mut parser = Parser::new(source);
    let mut def = CarDefinition::default();

    while let Some(token) = parser.next_token() {
        match token {
            Token::Word(key) => {
                let key = key.to_ascii_lowercase();
                parser.expect_open(&key)?;
                match key.as_str() {
                    "wagon" => parse_wagon_block(&mut parser, &mut def.wagon)?,
                    "engine" => {
                        let mut engine = def.engine.take().unwrap_or_default();
                        parse_engine_block(&mut parser, &mut engine, &mut def.wagon)?;
                        def.engine = Some(engine);
                    }
                    _ => {
                        warn!("unknown section '{key}' in definition, skipping");
                        parser.skip_block()?;
                    }
                }
            }
            Token::Close => return Err(ConfigError::UnbalancedClose),
            Token::Open => return Err(ConfigError::UnexpectedOpen),
        }
    }
    Ok(def)
}

fn parse_wagon_block(parser: &mut Parser, wagon: &mut WagonConfig) -> Result<(), ConfigError> {
    while let Some(key) = parser.next_key()? {
        if !parse_wagon_key(parser, &key, wagon)? {
            warn!("unknown wagon token '{key}', skipping");
            parser.skip_block()?;
        }
    }
    Ok(())
}

/// Parse one wagon-level key whose block is already open. Returns false,
/// consuming nothing further, when the key is not a wagon token.
fn parse_wagon_key(
    parser: &mut Parser,
    key: &str,
    wagon: &mut WagonConfig,
) -> Result<bool, ConfigError> {
    match key {
        "mass" => {
            if let Some(v) = scalar_block(parser, key, units::parse_mass_kg)? {
                wagon.mass_kg = v;
            }
        }
        "davis_a" => {
            if let Some(v) = scalar_block(parser, key, units::parse_scalar)? {
                wagon.davis_a_n = v;
            }
        }
        "davis_b" => {
            if let Some(v) = scalar_block(parser, key, units::parse_scalar)? {
                wagon.davis_b_n_per_mps = v;
            }
        }
        "davis_c" => {
            if let Some(v) = scalar_block(parser, key, units::parse_scalar)? {
                wagon.davis_c_n_per_mps2 = v;
            }
        }
        "maxbrakeforce" => {
            if let Some(v) = scalar_block(parser, key, units::parse_force_n)? {
                wagon.max_brake_force_n = v;
            }
        }
        "brakesystemtype" => {
            let values = parser.read_value_block()?;
            match values.first().map(|v| v.to_ascii_lowercase()).as_deref() {
                Some("air_single_pipe") => wagon.brake_system = BrakeKind::AirSinglePipe,
                Some("straight_air") => wagon.brake_system = BrakeKind::StraightAir,
                other => warn!("unknown brake system {other:?}, keeping default"),
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_engine_block(
    parser: &mut Parser,
    engine: &mut EngineConfig,
    wagon: &mut WagonConfig,
) -> Result<(), ConfigError> {
    while let Some(key) = parser.next_key()? {
        match key.as_str() {
            "maxpower" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_power_w)? {
                    engine.max_power_w = v;
                }
            }
            "maxforce" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_force_n)? {
                    engine.max_force_n = v;
                }
            }
            "maxvelocity" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_speed_mps)? {
                    engine.max_speed_mps = v;
                }
            }
            "airbrakesmainresvolume" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_volume_ft3)? {
                    engine.main_res_volume_ft3 = v;
                }
            }
            "airbrakesmainmaxairpressure" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_pressure_psi)? {
                    engine.max_main_res_pressure_psi = v;
                }
            }
            "airbrakescompressorrestartpressure" => {
                if let Some(v) = scalar_block(parser, &key, units::parse_pressure_psi)? {
                    engine.compressor_restart_pressure_psi = v;
                }
            }
            "enginecontrollers" => parse_controllers_block(parser, engine)?,
            // Anything else may be a base-car token; delegate before
            // giving up on it.
            _ => {
                if !parse_wagon_key(parser, &key, wagon)? {
                    warn!("unknown engine token '{key}', skipping");
                    parser.skip_block()?;
                }
            }
        }
    }
    Ok(())
}

fn parse_controllers_block(
    parser: &mut Parser,
    engine: &mut EngineConfig,
) -> Result<(), ConfigError> {
    while let Some(key) = parser.next_key()? {
        match key.as_str() {
            "throttle" | "regulator" => {
                engine.throttle = Some(parse_controller_block(parser)?);
            }
            "brake_train" => {
                engine.train_brake = Some(parse_controller_block(parser)?);
            }
            "brake_engine" => {
                engine.engine_brake = Some(parse_controller_block(parser)?);
            }
            _ => {
                warn!("unknown controller '{key}', skipping");
                parser.skip_block()?;
            }
        }
    }
    Ok(())
}

/// Parse a controller body: `step initial` scalars, then `notch ( pos )`
/// and `rate ( r )` sub-blocks in any order.
fn parse_controller_block(parser: &mut Parser) -> Result<ControllerConfig, ConfigError> {
    let mut cfg = ControllerConfig::default();
    let mut scalars: Vec<f32> = Vec::new();

    loop {
        match parser.next_token() {
            None => return Err(ConfigError::UnexpectedEnd),
            Some(Token::Close) => break,
            Some(Token::Open) => {
                // A stray nested block with no key; skip its contents.
                parser.skip_block()?;
            }
            Some(Token::Word(word)) => {
                let word = word.to_ascii_lowercase();
                if parser.peek_is_open() {
                    parser.expect_open(&word)?;
                    match word.as_str() {
                        "notch" => {
                            if let Some(v) = scalar_block(parser, &word, units::parse_scalar)? {
                                cfg.notches.push(v.clamp(0.0, 1.0));
                            }
                        }
                        "rate" => {
                            cfg.rate = scalar_block(parser, &word, units::parse_scalar)?;
                        }
                        _ => {
                            warn!("unknown controller token '{word}', skipping");
                            parser.skip_block()?;
                        }
                    }
                } else {
                    match units::parse_scalar(&word) {
                        Some(v) => scalars.push(v),
                        None => warn!("bad controller value '{word}', ignoring"),
                    }
                }
            }
        }
    }

    if let Some(step) = scalars.first() {
        cfg.step_size = *step;
    } else {
        warn!("controller definition has no step size");
    }
    if let Some(initial) = scalars.get(1) {
        cfg.initial = *initial;
    }
    Ok(cfg)
}

/// Read a single-value block, parse it with the given unit parser, and fall
/// back to the default (with a warning) on bad values.
fn scalar_block(
    parser: &mut Parser,
    key: &str,
    parse: fn(&str) -> Option<f32>,
) -> Result<Option<f32>, ConfigError> {
    let values = parser.read_value_block()?;
    match values.first().map(|v| parse(v)) {
        Some(Some(v)) => Ok(Some(v)),
        Some(None) => {
            warn!("bad value '{}' for '{key}', keeping default", values[0]);
            Ok(None)
        }
        None => {
            warn!("missing value for '{key}', keeping default");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = "
        wagon (
            mass ( 120t )
            davis_a ( 1200 )
            davis_b ( 60 )
            davis_c ( 10 )
            maxbrakeforce ( 90kN )
            brakesystemtype ( air_single_pipe )
        )
        engine (
            maxpower ( 2000kW )
            maxforce ( 300kN )
            maxvelocity ( 40 )
            airbrakesmainresvolume ( 10ft3 )
            airbrakesmainmaxairpressure ( 130psi )
            airbrakescompressorrestartpressure ( 110psi )
            enginecontrollers (
                throttle ( 0.1 0 notch ( 0 ) notch ( 0.25 ) notch ( 0.5 ) notch ( 0.75 ) notch ( 1 ) )
                brake_train ( 0.2 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
            )
        )
    ";

    #[test]
    fn test_parse_full_definition() {
        let def = parse_definition(DEFINITION).unwrap();

        assert_eq!(def.wagon.mass_kg, 120_000.0);
        assert_eq!(def.wagon.davis_a_n, 1200.0);
        assert_eq!(def.wagon.max_brake_force_n, 90_000.0);

        let engine = def.engine.as_ref().unwrap();
        assert_eq!(engine.max_power_w, 2_000_000.0);
        assert_eq!(engine.max_force_n, 300_000.0);
        assert_eq!(engine.max_speed_mps, 40.0);
        assert_eq!(engine.throttle.as_ref().unwrap().notches.len(), 5);
        assert_eq!(engine.train_brake.as_ref().unwrap().step_size, 0.2);
        assert!(engine.engine_brake.is_none());
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let def = parse_definition("ENGINE ( MaxPower ( 500kW ) )").unwrap();
        assert_eq!(def.engine.unwrap().max_power_w, 500_000.0);
    }

    #[test]
    fn test_unknown_tokens_are_skipped() {
        let def = parse_definition(
            "engine ( maxpower ( 500kW ) pantograph ( up 2 down ( 1 ) ) maxforce ( 100kN ) )",
        )
        .unwrap();
        let engine = def.engine.unwrap();
        assert_eq!(engine.max_power_w, 500_000.0);
        assert_eq!(engine.max_force_n, 100_000.0);
    }

    #[test]
    fn test_engine_delegates_wagon_keys() {
        let def = parse_definition("engine ( mass ( 90t ) maxpower ( 500kW ) )").unwrap();
        assert_eq!(def.wagon.mass_kg, 90_000.0);
        assert_eq!(def.engine.unwrap().max_power_w, 500_000.0);
    }

    #[test]
    fn test_bad_value_keeps_default() {
        let def = parse_definition("engine ( maxvelocity ( fast ) )").unwrap();
        assert_eq!(def.engine.unwrap().max_speed_mps, 1000.0);
    }

    #[test]
    fn test_zero_step_controller_builds_absent() {
        let def = parse_definition(
            "engine ( enginecontrollers ( brake_train ( 0 0 notch ( 0 ) notch ( 1 ) ) ) )",
        )
        .unwrap();
        let car = def.build(21.0);
        let loco = car.locomotive.as_ref().unwrap();
        assert!(loco.train_brake_controller.is_none());
    }

    #[test]
    fn test_zero_notch_controller_builds_absent() {
        let def =
            parse_definition("engine ( enginecontrollers ( throttle ( 0.1 0 ) ) )").unwrap();
        let car = def.build(21.0);
        assert!(car.locomotive.as_ref().unwrap().throttle_controller.is_none());
    }

    #[test]
    fn test_build_wires_everything() {
        let def = parse_definition(DEFINITION).unwrap();
        let car = def.build(21.0);

        assert_eq!(car.mass_kg, 120_000.0);
        assert!(car.brakes.supports_equalizing_res_display());
        let loco = car.locomotive.as_ref().unwrap();
        assert_eq!(loco.max_power_w, 2_000_000.0);
        assert!(loco.throttle_controller.is_some());
        assert!(loco.train_brake_controller.is_some());
        assert!(loco.engine_brake_controller.is_none());
        assert_eq!(loco.main_res_pressure_psi, 130.0);
    }

    #[test]
    fn test_wagon_only_definition_is_unpowered() {
        let def = parse_definition("wagon ( mass ( 40t ) )").unwrap();
        let car = def.build(21.0);
        assert!(!car.is_driveable());
    }

    #[test]
    fn test_straight_air_selection() {
        let def = parse_definition("wagon ( brakesystemtype ( straight_air ) )").unwrap();
        let car = def.build(21.0);
        assert!(!car.brakes.supports_equalizing_res_display());
    }

    #[test]
    fn test_structural_errors_fail() {
        assert!(parse_definition("engine ( maxpower ( 500kW )").is_err());
        assert!(parse_definition("engine )").is_err());
        assert!(parse_definition("engine maxpower").is_err());
    }

    #[test]
    fn test_continuous_rate_controller() {
        let def = parse_definition(
            "engine ( enginecontrollers ( throttle ( 0.1 0 rate ( 0.25 ) notch ( 0 ) notch ( 1 ) ) ) )",
        )
        .unwrap();
        let cfg = def.engine.unwrap().throttle.unwrap();
        assert_eq!(cfg.rate, Some(0.25));
        let ctrl = cfg.build().unwrap();
        assert_eq!(ctrl.continuous_rate(), Some(0.25));
    }
}
