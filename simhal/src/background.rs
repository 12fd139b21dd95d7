//! Background stepper.
//!
//! Pumps ticks from a dedicated thread so robot programs that never call
//! `drive_one_tick` themselves still see the world advance. The thread is
//! the stepper: each iteration drives one tick and then lets `period` of
//! simulated time pass by driving `ceil(period / tick_duration)` more. The
//! period is re-read every iteration, so `set_tick_period` changes the
//! cadence of a running loop. It exits silently when a tick fails.

use crate::coordinator::StepCoordinator;
use crate::error::StepError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name given to the background stepper thread.
pub const BACKGROUND_THREAD_NAME: &str = "simhal-stepper";

/// Handle to a running background stepper.
#[derive(Debug)]
pub struct BackgroundStepper {
    handle: JoinHandle<u64>,
}

impl BackgroundStepper {
    /// True once the stepper thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the stepper to exit and return the number of ticks it drove.
    ///
    /// # Errors
    /// Returns `StepError::BackgroundPanicked` if the thread panicked.
    pub fn join(self) -> Result<u64, StepError> {
        self.handle.join().map_err(|_| StepError::BackgroundPanicked)
    }
}

/// Ticks of `tick_duration` needed to cover `period`, rounded up.
///
/// A zero tick duration is treated as one nanosecond.
pub fn pace_ticks(period: Duration, tick_duration: Duration) -> u64 {
    let tick = tick_duration.as_nanos().max(1);
    u64::try_from(period.as_nanos().div_ceil(tick)).unwrap_or(u64::MAX)
}

/// Unregisters the loop from the coordinator when the thread exits.
struct LoopRegistration {
    coordinator: Arc<StepCoordinator>,
}

impl Drop for LoopRegistration {
    fn drop(&mut self) {
        self.coordinator.unregister_background_loop();
    }
}

impl StepCoordinator {
    /// Ticks the background stepper drives after each explicit tick.
    pub fn background_pace(&self) -> u64 {
        pace_ticks(self.tick_period(), self.tick_duration())
    }

    /// Start driving ticks from a background thread.
    ///
    /// If `period_ms` is given it becomes the coordinator's tick period.
    /// Only one background stepper should run per session; starting a
    /// second one is logged but not prevented.
    ///
    /// # Errors
    /// - `StepError::InvalidTickPeriod` if `period_ms` is `Some(0)`
    /// - `StepError::Spawn` if the thread cannot be created
    pub fn run_in_background(
        self: &Arc<Self>,
        period_ms: Option<u64>,
    ) -> Result<BackgroundStepper, StepError> {
        if let Some(period_ms) = period_ms {
            self.set_tick_period(period_ms)?;
        }

        let already_running = self.register_background_loop();
        if already_running > 0 {
            warn!(
                "Starting background stepper while {} already running; tick order is undefined",
                already_running
            );
        }
        let registration = LoopRegistration {
            coordinator: Arc::clone(self),
        };

        info!(
            "Starting background stepper (period={}ms, {} ticks per period)",
            self.tick_period_ms(),
            self.background_pace()
        );

        let handle = thread::Builder::new()
            .name(BACKGROUND_THREAD_NAME.to_string())
            .spawn(move || {
                let coordinator = Arc::clone(&registration.coordinator);
                let start = coordinator.ticks();
                loop {
                    if !coordinator.drive_one_tick() {
                        break;
                    }
                    if !coordinator.drive_ticks(coordinator.background_pace()) {
                        break;
                    }
                }
                let driven = coordinator.ticks() - start;
                debug!("Background stepper exiting after {} ticks", driven);
                drop(registration);
                driven
            })
            .map_err(|e| StepError::Spawn(e.to_string()))?;

        Ok(BackgroundStepper { handle })
    }
}
