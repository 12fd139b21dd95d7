//! Workspace-wide constants.
//!
//! Defaults mirror the behaviour of the simulated brick: a 500 ms
//! background step period and a 32 ms basic simulator time step.

/// Canonical service name (used for logging).
pub const SIMHAL_SERVICE_NAME: &str = "simhal";

/// Name of the built-in simulation driver.
pub const SIMULATION_DRIVER_NAME: &str = "simulation";

/// Default tick period used by `sleep_for` and the background stepper, in milliseconds.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 500;

/// Default simulated duration of one tick, in milliseconds.
pub const DEFAULT_TICK_DURATION_MS: u64 = 32;

/// Default number of rendezvous parties (main thread only).
pub const DEFAULT_PARTIES: usize = 1;
