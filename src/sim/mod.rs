//! Simulation core: controllers, cars, locomotive physics and the train
//! coordinator.

pub mod brakes;
pub mod car;
pub mod controller;
pub mod events;
pub mod locomotive;
pub mod train;
