//! Simulation driver module.
//!
//! Provides a fixed-step simulated world so the step coordinator can run
//! without an external physics simulator.

mod world;

pub use world::SimulatedWorld;

use simhal_common::config::SimulationConfig;
use simhal_common::driver::{DriverError, TickDriver};

/// Factory function to create a simulation driver instance.
pub fn create_driver(config: &SimulationConfig) -> Result<Box<dyn TickDriver>, DriverError> {
    Ok(Box::new(SimulatedWorld::from_config(config)?))
}
