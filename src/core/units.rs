//! Unit-Suffixed Scalar Parsing
//!
//! Rolling-stock definitions carry values like `2000kW`, `300kN` or `70mph`.
//! These helpers split the numeric prefix from the unit suffix and convert to
//! the base units used throughout the simulation (W, N, m/s, psi, ft³, kg).
//!
//! An unknown suffix yields `None`; the configuration layer logs a warning
//! and substitutes the default, per the non-fatal error contract.

/// Watts per horsepower.
const W_PER_HP: f32 = 745.7;

/// Newtons per pound-force.
const N_PER_LBF: f32 = 4.448_22;

/// Metres per second per mile per hour.
const MPS_PER_MPH: f32 = 0.447_04;

/// Metres per second per kilometre per hour.
const MPS_PER_KMH: f32 = 0.277_778;

/// PSI per kilopascal.
const PSI_PER_KPA: f32 = 0.145_038;

/// PSI per bar.
const PSI_PER_BAR: f32 = 14.503_8;

/// Cubic feet per cubic metre.
const FT3_PER_M3: f32 = 35.314_7;

/// Kilograms per (metric) tonne.
const KG_PER_T: f32 = 1000.0;

/// Kilograms per pound.
const KG_PER_LB: f32 = 0.453_592;

/// Split a token into its numeric value and unit suffix.
///
/// The longest prefix that parses as a float wins, so `10ft3` splits into
/// `10` and `ft3` and `2e3kw` into `2e3` and `kw`.
fn split_suffix(token: &str) -> Option<(f32, String)> {
    let token = token.trim();
    for end in (1..=token.len()).rev() {
        if !token.is_char_boundary(end) {
            continue;
        }
        if let Ok(value) = token[..end].parse::<f32>() {
            return Some((value, token[end..].to_ascii_lowercase()));
        }
    }
    None
}

/// Parse a power value into watts. Accepts `w`, `kw`, `mw`, `hp`.
pub fn parse_power_w(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "w" => Some(value),
        "kw" => Some(value * 1000.0),
        "mw" => Some(value * 1_000_000.0),
        "hp" => Some(value * W_PER_HP),
        _ => None,
    }
}

/// Parse a force value into newtons. Accepts `n`, `kn`, `lbf`.
pub fn parse_force_n(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "n" => Some(value),
        "kn" => Some(value * 1000.0),
        "lbf" => Some(value * N_PER_LBF),
        _ => None,
    }
}

/// Parse a speed value into metres per second. Accepts `m/s`, `kmh`, `kph`, `mph`.
pub fn parse_speed_mps(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "m/s" | "mps" => Some(value),
        "kmh" | "kph" | "km/h" => Some(value * MPS_PER_KMH),
        "mph" => Some(value * MPS_PER_MPH),
        _ => None,
    }
}

/// Parse a pressure value into PSI. Accepts `psi`, `kpa`, `bar`.
pub fn parse_pressure_psi(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "psi" => Some(value),
        "kpa" => Some(value * PSI_PER_KPA),
        "bar" => Some(value * PSI_PER_BAR),
        _ => None,
    }
}

/// Parse a volume value into cubic feet. Accepts `ft3`, `m3`.
pub fn parse_volume_ft3(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "ft3" => Some(value),
        "m3" => Some(value * FT3_PER_M3),
        _ => None,
    }
}

/// Parse a mass value into kilograms. Accepts `kg`, `t`, `lb`.
pub fn parse_mass_kg(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    match suffix.as_str() {
        "" | "kg" => Some(value),
        "t" => Some(value * KG_PER_T),
        "lb" => Some(value * KG_PER_LB),
        _ => None,
    }
}

/// Parse a dimensionless value (Davis coefficients and the like).
pub fn parse_scalar(token: &str) -> Option<f32> {
    let (value, suffix) = split_suffix(token)?;
    suffix.is_empty().then_some(value)
}
