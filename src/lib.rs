//! # Railmotive
//!
//! Deterministic locomotive control and train physics core: the per-tick
//! simulation of throttle, traction, braking and pneumatics that drives
//! train motion, decoupled from rendering, input handling and content I/O.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RAILMOTIVE                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── units.rs     - Unit-suffixed scalar parsing             │
//! │  └── hash.rs      - State hashing for verification           │
//! │                                                              │
//! │  config/          - Rolling-stock definitions                │
//! │  ├── tokens.rs    - Nested token/value stream                │
//! │  └── mod.rs       - Wagon/engine/controller parsing          │
//! │                                                              │
//! │  sim/             - Simulation core (deterministic)          │
//! │  ├── controller.rs- Notched cab levers                       │
//! │  ├── brakes.rs    - Pneumatic subsystem interface            │
//! │  ├── locomotive.rs- Control state and tick update            │
//! │  ├── car.rs       - Generic car record (composition)         │
//! │  ├── events.rs    - Discrete cab events                      │
//! │  └── train.rs     - Coordinator owning MU state              │
//! │                                                              │
//! │  snapshot/        - Fixed-order binary save/restore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The simulation is single-threaded and synchronous: commands apply
//! immediately, [`Train::update`] runs once per tick, and identical command
//! sequences produce bit-identical state on any platform. The state hash in
//! `core/hash.rs` makes that checkable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod sim;
pub mod snapshot;

// Re-export commonly used types
pub use config::{parse_definition, CarDefinition, ConfigError};
pub use sim::brakes::BrakeSystem;
pub use sim::car::Car;
pub use sim::controller::EngineController;
pub use sim::events::CarEvent;
pub use sim::locomotive::{Direction, LocomotiveControls, TickContext};
pub use sim::train::{MuCommand, Train, TrainEvent};
pub use snapshot::SnapshotError;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default brake pipe charging rate, PSI/s, injected into trains that have
/// no site-specific value configured.
pub const DEFAULT_PIPE_CHARGING_RATE_PSI_PER_S: f32 = 21.0;
