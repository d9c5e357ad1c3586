//! Fixed-Order Binary Snapshots
//!
//! Deterministic save/restore of the simulation state. The layout is a
//! contract: per locomotive the order is Bell, Sander, Wiper, MaxPower,
//! MaxForce, MaxSpeed, MainResPressure, CompressorOn, then the throttle,
//! train brake and engine brake levers (each a presence flag plus payload),
//! a cab tail section, and finally the owning car's own fields. Horn is
//! deliberately not persisted; it is momentary.
//!
//! The train-level snapshot carries a magic and a format version ahead of
//! the per-car data. Restore is strict: presence-flag or car-count
//! mismatches against the state being restored, non-0/1 boolean bytes,
//! out-of-range ordinals, truncation and trailing bytes all fail the load
//! instead of silently misaligning later fields.
//!
//! Restoring Bell/Sander/Wiper re-dispatches the corresponding on-events
//! through the train's event path, so their side effects fire exactly as in
//! live operation.

use thiserror::Error;

use crate::sim::car::Car;
use crate::sim::controller::EngineController;
use crate::sim::events::CarEvent;
use crate::sim::locomotive::{Direction, LocomotiveControls};
use crate::sim::train::Train;

/// Magic bytes at the head of a train snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RMSV";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Upper bound on stored notch counts; anything larger is corruption.
const MAX_NOTCHES: u32 = 1024;

/// A snapshot could not be decoded or does not fit the restoring state.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot ended before all fields were read.
    #[error("unexpected end of snapshot at byte {0}")]
    UnexpectedEof(usize),
    /// A boolean byte was neither 0 nor 1.
    #[error("corrupt boolean {value:#04x} at byte {offset}")]
    CorruptBool {
        /// Byte offset of the bad value.
        offset: usize,
        /// The value found.
        value: u8,
    },
    /// The snapshot does not start with the expected magic.
    #[error("bad snapshot magic")]
    BadMagic,
    /// The snapshot was written by an unknown format version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    /// The snapshot holds a different number of cars than the consist.
    #[error("snapshot has {saved} cars but the consist has {actual}")]
    CarCountMismatch {
        /// Cars recorded in the snapshot.
        saved: usize,
        /// Cars in the restoring consist.
        actual: usize,
    },
    /// A lever's presence flag does not match the restoring locomotive.
    #[error("{lever} lever presence in snapshot does not match this locomotive")]
    ControllerPresenceMismatch {
        /// Which lever mismatched.
        lever: &'static str,
    },
    /// A car's locomotive presence flag does not match the consist.
    #[error("locomotive presence in snapshot does not match car {car}")]
    LocomotivePresenceMismatch {
        /// Index of the mismatching car.
        car: usize,
    },
    /// A stored lever payload is not a valid controller.
    #[error("corrupt controller payload")]
    CorruptController,
    /// An ordinal field holds an out-of-range value.
    #[error("corrupt {field} ordinal {value}")]
    CorruptOrdinal {
        /// Field name.
        field: &'static str,
        /// The value found.
        value: u8,
    },
    /// Extra bytes after the last field.
    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),
}

/// Byte-order-stable snapshot writer.
#[derive(Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a boolean as a single 0/1 byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Append a u8.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a u32, little-endian.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an f32 bit pattern, little-endian.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    /// Finish and take the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded snapshot.
pub struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    /// Wrap an encoded snapshot.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.remaining() < n {
            return Err(SnapshotError::UnexpectedEof(self.pos));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Read raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        self.take(n)
    }

    /// Read a strict 0/1 boolean byte.
    pub fn read_bool(&mut self) -> Result<bool, SnapshotError> {
        let offset = self.pos;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(SnapshotError::CorruptBool { offset, value }),
        }
    }

    /// Read a u8.
    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, SnapshotError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian f32 bit pattern.
    pub fn read_f32(&mut self) -> Result<f32, SnapshotError> {
        let bytes = self.take(4)?;
        Ok(f32::from_bits(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }
}

fn save_controller(w: &mut SnapshotWriter, ctrl: Option<&EngineController>) {
    w.write_bool(ctrl.is_some());
    let Some(ctrl) = ctrl else { return };
    w.write_f32(ctrl.position());
    w.write_f32(ctrl.step_size());
    match ctrl.continuous_rate() {
        Some(rate) => {
            w.write_bool(true);
            w.write_f32(rate);
        }
        None => w.write_bool(false),
    }
    w.write_bool(ctrl.is_emergency());
    w.write_u32(ctrl.notches().len() as u32);
    for notch in ctrl.notches() {
        w.write_f32(*notch);
    }
}

/// Restore a lever into its slot. A presence flag that disagrees with the
/// slot is corruption; a slot absent at save time stays absent.
fn restore_controller(
    r: &mut SnapshotReader,
    slot: &mut Option<EngineController>,
    lever: &'static str,
) -> Result<(), SnapshotError> {
    let present = r.read_bool()?;
    if present != slot.is_some() {
        return Err(SnapshotError::ControllerPresenceMismatch { lever });
    }
    if !present {
        return Ok(());
    }
    let position = r.read_f32()?;
    let step_size = r.read_f32()?;
    let rate = if r.read_bool()? { Some(r.read_f32()?) } else { None };
    let emergency = r.read_bool()?;
    let count = r.read_u32()?;
    if count > MAX_NOTCHES {
        return Err(SnapshotError::CorruptController);
    }
    let mut notches = Vec::with_capacity(count as usize);
    for _ in 0..count {
        notches.push(r.read_f32()?);
    }
    let mut ctrl = EngineController::new(step_size, position, rate, notches)
        .ok_or(SnapshotError::CorruptController)?;
    if emergency {
        ctrl.set_emergency();
    }
    *slot = Some(ctrl);
    Ok(())
}

fn direction_to_u8(direction: Direction) -> u8 {
    match direction {
        Direction::Neutral => 0,
        Direction::Forward => 1,
        Direction::Reverse => 2,
    }
}

fn direction_from_u8(value: u8) -> Result<Direction, SnapshotError> {
    match value {
        0 => Ok(Direction::Neutral),
        1 => Ok(Direction::Forward),
        2 => Ok(Direction::Reverse),
        value => Err(SnapshotError::CorruptOrdinal { field: "direction", value }),
    }
}

fn save_locomotive(w: &mut SnapshotWriter, loco: &LocomotiveControls) {
    // Contracted field order. Horn is intentionally absent.
    w.write_bool(loco.bell);
    w.write_bool(loco.sander);
    w.write_bool(loco.wiper);
    w.write_f32(loco.max_power_w);
    w.write_f32(loco.max_force_n);
    w.write_f32(loco.max_speed_mps);
    w.write_f32(loco.main_res_pressure_psi);
    w.write_bool(loco.compressor_on);
    save_controller(w, loco.throttle_controller.as_ref());
    save_controller(w, loco.train_brake_controller.as_ref());
    save_controller(w, loco.engine_brake_controller.as_ref());
    // Cab tail.
    w.write_u8(direction_to_u8(loco.direction));
    w.write_f32(loco.throttle_percent);
    w.write_u8(loco.headlight);
    w.write_bool(loco.bail_off);
    w.write_f32(loco.max_main_res_pressure_psi);
    w.write_f32(loco.compressor_restart_pressure_psi);
    w.write_f32(loco.main_res_volume_ft3);
}

/// Restore a locomotive in snapshot order. Returns the cab events to
/// re-dispatch; the flags themselves are only set through that dispatch.
fn restore_locomotive(
    r: &mut SnapshotReader,
    loco: &mut LocomotiveControls,
) -> Result<Vec<CarEvent>, SnapshotError> {
    loco.horn = false;
    loco.bell = false;
    loco.sander = false;
    loco.wiper = false;

    let mut events = Vec::new();
    if r.read_bool()? {
        events.push(CarEvent::BellOn);
    }
    if r.read_bool()? {
        events.push(CarEvent::SanderOn);
    }
    if r.read_bool()? {
        events.push(CarEvent::WiperOn);
    }
    loco.max_power_w = r.read_f32()?;
    loco.max_force_n = r.read_f32()?;
    loco.max_speed_mps = r.read_f32()?;
    loco.main_res_pressure_psi = r.read_f32()?;
    loco.compressor_on = r.read_bool()?;
    restore_controller(r, &mut loco.throttle_controller, "throttle")?;
    restore_controller(r, &mut loco.train_brake_controller, "train brake")?;
    restore_controller(r, &mut loco.engine_brake_controller, "engine brake")?;

    loco.direction = direction_from_u8(r.read_u8()?)?;
    loco.throttle_percent = r.read_f32()?;
    let headlight = r.read_u8()?;
    if headlight > 2 {
        return Err(SnapshotError::CorruptOrdinal { field: "headlight", value: headlight });
    }
    loco.headlight = headlight;
    loco.bail_off = r.read_bool()?;
    loco.max_main_res_pressure_psi = r.read_f32()?;
    loco.compressor_restart_pressure_psi = r.read_f32()?;
    loco.main_res_volume_ft3 = r.read_f32()?;

    // Derived gauges are recomputed on the next tick.
    loco.force_indicator = 0.0;
    loco.throttle_indicator = 0.0;
    Ok(events)
}

fn save_car(w: &mut SnapshotWriter, car: &Car) {
    w.write_bool(car.locomotive.is_some());
    if let Some(loco) = car.locomotive.as_ref() {
        save_locomotive(w, loco);
    }
    w.write_f32(car.mass_kg);
    w.write_f32(car.davis_a_n);
    w.write_f32(car.davis_b_n_per_mps);
    w.write_f32(car.davis_c_n_per_mps2);
    w.write_f32(car.max_brake_force_n);
}

fn restore_car(
    r: &mut SnapshotReader,
    car: &mut Car,
    index: usize,
) -> Result<Vec<CarEvent>, SnapshotError> {
    let driveable = r.read_bool()?;
    if driveable != car.locomotive.is_some() {
        return Err(SnapshotError::LocomotivePresenceMismatch { car: index });
    }
    let events = match car.locomotive.as_mut() {
        Some(loco) => restore_locomotive(r, loco)?,
        None => Vec::new(),
    };
    car.mass_kg = r.read_f32()?;
    car.davis_a_n = r.read_f32()?;
    car.davis_b_n_per_mps = r.read_f32()?;
    car.davis_c_n_per_mps2 = r.read_f32()?;
    car.max_brake_force_n = r.read_f32()?;
    car.motive_force_n = 0.0;
    car.friction_force_n = 0.0;
    Ok(events)
}

impl Train {
    /// Encode the full train state.
    pub fn save(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new();
        w.write_bytes(&SNAPSHOT_MAGIC);
        w.write_u8(SNAPSHOT_VERSION);
        w.write_f32(self.speed_mps);
        w.write_f32(self.mu_reverser_percent());
        w.write_f32(self.ai_train_brake_percent());
        w.write_f32(self.brake_pipe_pressure_psi());
        w.write_u32(self.cars.len() as u32);
        for car in &self.cars {
            save_car(&mut w, car);
        }
        w.into_bytes()
    }

    /// Restore a snapshot into a consist built from the same definitions.
    ///
    /// Bell/Sander/Wiper on-states are re-dispatched through the event path
    /// and therefore appear in [`Train::take_events`]. On error the train
    /// state is partially written and must be discarded.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let mut r = SnapshotReader::new(bytes);
        if r.read_bytes(4)? != &SNAPSHOT_MAGIC[..] {
            return Err(SnapshotError::BadMagic);
        }
        let version = r.read_u8()?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }

        let speed_mps = r.read_f32()?;
        let mu_reverser_percent = r.read_f32()?;
        let ai_brake_percent = r.read_f32()?;
        let brake_pipe_pressure_psi = r.read_f32()?;

        let saved = r.read_u32()? as usize;
        if saved != self.cars.len() {
            return Err(SnapshotError::CarCountMismatch { saved, actual: self.cars.len() });
        }

        let mut redispatch: Vec<(usize, Vec<CarEvent>)> = Vec::new();
        for index in 0..self.cars.len() {
            let events = restore_car(&mut r, &mut self.cars[index], index)?;
            if !events.is_empty() {
                redispatch.push((index, events));
            }
        }
        if r.remaining() != 0 {
            return Err(SnapshotError::TrailingBytes(r.remaining()));
        }

        self.set_persisted_mu_state(
            speed_mps,
            mu_reverser_percent,
            ai_brake_percent,
            brake_pipe_pressure_psi,
        );
        for (index, events) in redispatch {
            for event in events {
                self.signal_event(index, event);
            }
        }
        Ok(())
    }
}
