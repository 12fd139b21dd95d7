//! Fixed-step simulated world.
//!
//! Stands in for the physics simulator: every advance moves simulated time
//! forward by one tick duration. The session ends after `max_ticks` ticks,
//! which models the simulator being closed or reloaded.

use simhal_common::config::SimulationConfig;
use simhal_common::consts::SIMULATION_DRIVER_NAME;
use simhal_common::driver::{DriverError, TickDriver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Simulation driver implementing the `TickDriver` trait.
#[derive(Debug)]
pub struct SimulatedWorld {
    /// Simulated time covered by one tick
    tick_duration: Duration,
    /// Ticks applied so far
    tick: u64,
    /// Session length, if bounded
    max_ticks: Option<u64>,
    /// Pace ticks to wall-clock time
    realtime: bool,
    /// Wall-clock deadline of the next tick in realtime mode
    next_deadline: Option<Instant>,
}

impl SimulatedWorld {
    /// Create a world from the simulation configuration section.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` if the configuration is invalid.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, DriverError> {
        config
            .validate()
            .map_err(|e| DriverError::ConfigError(e.to_string()))?;

        info!(
            "Simulated world: tick_duration={}ms, max_ticks={:?}, realtime={}",
            config.tick_duration_ms, config.max_ticks, config.realtime
        );

        Ok(Self {
            tick_duration: config.tick_duration(),
            tick: 0,
            max_ticks: config.max_ticks,
            realtime: config.realtime,
            next_deadline: None,
        })
    }

    /// Ticks applied so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time elapsed since the start of the session.
    pub fn elapsed(&self) -> Duration {
        self.tick_duration.saturating_mul(u32::try_from(self.tick).unwrap_or(u32::MAX))
    }

    fn pace(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now) + self.tick_duration;
        if deadline > now {
            thread::sleep(deadline - now);
            self.next_deadline = Some(deadline);
        } else {
            // Behind schedule: restart pacing from now instead of bursting.
            self.next_deadline = Some(now);
        }
    }
}

impl TickDriver for SimulatedWorld {
    fn name(&self) -> &'static str {
        SIMULATION_DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    fn advance_one_tick(&mut self) -> Result<bool, DriverError> {
        if let Some(max) = self.max_ticks {
            if self.tick >= max {
                debug!("Simulated world reached max_ticks={}", max);
                return Ok(false);
            }
        }

        if self.realtime {
            self.pace();
        }
        self.tick += 1;
        Ok(true)
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        info!(
            "Shutting down simulated world at tick {} ({:?} simulated)",
            self.tick,
            self.elapsed()
        );
        Ok(())
    }
}
