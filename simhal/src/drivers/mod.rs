//! Tick driver implementations.
//!
//! - [`simulation`] - Fixed-step simulated world for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `TickDriver` trait from `simhal_common::driver`
//! 3. Register the factory in `register_builtin_drivers()`

pub mod simulation;

use crate::driver_registry::DriverRegistry;
use simhal_common::consts::SIMULATION_DRIVER_NAME;

/// Register all built-in drivers.
pub fn register_builtin_drivers(registry: &mut DriverRegistry) {
    registry.register(SIMULATION_DRIVER_NAME, simulation::create_driver);
}
