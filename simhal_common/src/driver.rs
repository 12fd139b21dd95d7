//! Tick driver trait and error types.
//!
//! This module defines:
//! - `TickDriver` trait - Interface for the component that owns the simulated world
//! - `DriverError` enum - Error types for driver operations
//! - `DriverFactory` type alias - Factory function type

use crate::config::SimulationConfig;
use std::time::Duration;
use thiserror::Error;

/// Error types for tick driver operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Communication with the simulator failed
    #[error("Simulator communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn(&SimulationConfig) -> Result<Box<dyn TickDriver>, DriverError>;

/// Owner of the simulated world.
///
/// Exactly one thread, the stepper, advances the world through this trait.
/// Everything else observes tick boundaries through the step coordinator.
///
/// # Lifecycle
///
/// 1. `advance_one_tick()` - Called once per round by the stepper
/// 2. `shutdown()` - Called once when the session is torn down
///
/// # Contract
///
/// | Return | Meaning |
/// |--------|---------|
/// | `Ok(true)` | Tick applied, session continues |
/// | `Ok(false)` | Simulator is terminating, no further ticks |
/// | `Err(_)` | Fault; the coordinator logs it and ends the session |
pub trait TickDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Simulated time covered by one tick.
    fn tick_duration(&self) -> Duration;

    /// Advance the simulated world by exactly one tick.
    ///
    /// Blocks until the simulator has applied the tick.
    fn advance_one_tick(&mut self) -> Result<bool, DriverError>;

    /// Release simulator resources.
    ///
    /// Default: no-op.
    fn shutdown(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
