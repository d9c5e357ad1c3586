//! Railmotive Demo
//!
//! Builds a consist from token-stream definitions, drives it through a
//! scripted session (power up, cruise, service braking to a stand), then
//! verifies the snapshot codec by saving, restoring into a fresh consist
//! and comparing state hashes.

use anyhow::Context;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use railmotive::{
    parse_definition, CarEvent, Direction, Train, DEFAULT_PIPE_CHARGING_RATE_PSI_PER_S, VERSION,
};

/// Head-end locomotive definition.
const LOCO_DEF: &str = "
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
            throttle ( 0.125 0 notch ( 0 ) notch ( 0.25 ) notch ( 0.5 ) notch ( 0.75 ) notch ( 1 ) )
            brake_train ( 0.1 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
            brake_engine ( 0.25 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
        )
    )
";

/// Trailing freight wagon definition.
const WAGON_DEF: &str = "
    wagon (
        mass ( 40t )
        davis_a ( 600 )
        davis_b ( 30 )
        davis_c ( 4 )
        maxbrakeforce ( 60kN )
    )
";

/// Scripted session parameters, optionally loaded from a JSON file given as
/// the first argument.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Scenario {
    /// Simulation tick length, seconds.
    dt_seconds: f32,
    /// Total session length, seconds.
    duration_seconds: f32,
    /// Trailing wagons behind the locomotive.
    wagons: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        Self { dt_seconds: 0.1, duration_seconds: 180.0, wagons: 8 }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Railmotive v{}", VERSION);

    let scenario = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing scenario {path}"))?
        }
        None => Scenario::default(),
    };
    info!(
        "Scenario: {} wagons, {}s at dt={}s",
        scenario.wagons, scenario.duration_seconds, scenario.dt_seconds
    );

    let train = run_session(&scenario)?;
    verify_snapshot(&scenario, &train)?;
    Ok(())
}

fn build_train(scenario: &Scenario) -> anyhow::Result<Train> {
    let loco = parse_definition(LOCO_DEF).context("parsing locomotive definition")?;
    let wagon = parse_definition(WAGON_DEF).context("parsing wagon definition")?;

    let mut train = Train::new(DEFAULT_PIPE_CHARGING_RATE_PSI_PER_S);
    train.add_car(loco.build(30.0));
    for i in 0..scenario.wagons {
        // Pipe changes propagate slower the further back the car sits.
        let propagation = 25.0 / (1.0 + i as f32 * 0.4);
        train.add_car(wagon.build(propagation));
    }
    Ok(train)
}

fn run_session(scenario: &Scenario) -> anyhow::Result<Train> {
    let mut train = build_train(scenario)?;
    let dt = scenario.dt_seconds;
    let ticks = (scenario.duration_seconds / dt) as u32;
    let brake_point = ticks / 2;

    info!("=== Starting session: {} cars, {} ticks ===", train.cars.len(), ticks);

    train.signal_event(0, CarEvent::BellOn);
    train.step_headlight(0, false);
    train.step_headlight(0, false);
    train.set_direction(0, Direction::Forward);

    let mut last_report = 0u32;
    for tick in 0..ticks {
        // Notch up early on, shut off and brake from the midpoint.
        if tick < brake_point {
            if tick % 50 == 0 {
                train.increase_throttle(0, dt);
            }
        } else {
            if tick % 20 == 0 {
                train.decrease_throttle(0, dt);
            }
            if tick % 100 == 0 {
                train.change_train_brakes(0, 10.0, dt);
            }
        }

        train.update(dt);

        for event in train.take_events() {
            info!("Event on car {}: {:?}", event.car, event.event);
        }

        if tick - last_report >= (10.0 / dt) as u32 {
            let loco = train.cars[0].locomotive.as_ref().unwrap();
            info!(
                "t={:>5.1}s speed={:>5.2} m/s throttle={:>3.0}% force={:>8.0} N res={:>5.1} psi",
                tick as f32 * dt,
                train.speed_mps,
                loco.throttle_percent,
                train.cars[0].motive_force_n,
                loco.main_res_pressure_psi,
            );
            info!("  train brake: {}", train.train_brake_status(0));
            if let Some(status) = train.engine_brake_status(0) {
                info!("  engine brake: {status}");
            }
            last_report = tick;
        }
    }

    info!("=== Session over: speed {:.2} m/s ===", train.speed_mps);
    Ok(train)
}

fn verify_snapshot(scenario: &Scenario, train: &Train) -> anyhow::Result<()> {
    info!("=== Verifying snapshot round trip ===");
    let bytes = train.save();
    info!("Snapshot: {} bytes", bytes.len());

    let mut restored = build_train(scenario)?;
    restored
        .restore(&bytes)
        .context("restoring snapshot into fresh consist")?;
    for event in restored.take_events() {
        info!("Restore re-dispatched {:?} on car {}", event.event, event.car);
    }

    let saved_hash = train.state_hash();
    let restored_hash = restored.state_hash();
    info!("Saved state hash:    {}", hex::encode(saved_hash));
    info!("Restored state hash: {}", hex::encode(restored_hash));

    anyhow::ensure!(saved_hash == restored_hash, "state hash mismatch after restore");
    info!("ROUND TRIP VERIFIED: hashes match");
    Ok(())
}
