//! Step-synchronization controller.
//!
//! `StepCoordinator` lets any number of threads share one simulated world
//! that only advances when explicitly stepped. One thread, the stepper,
//! calls [`StepCoordinator::drive_one_tick`]; every other party calls
//! [`StepCoordinator::wait_until_next_tick`]. Each round has two rendezvous
//! points around the external advance:
//!
//! ```text
//!   stepper            follower(s)
//!      │                   │
//!      ├── pre-step ───────┤   all N parties arrive
//!      │ advance_one_tick  │   followers blocked
//!      ├── post-step ──────┤   all N parties leave together
//!      ▼                   ▼
//! ```
//!
//! With a single party the rendezvous is skipped and waiting for the next
//! tick is the same as driving it. When every party of a round is waiting
//! and none is driving, the last party to arrive at the pre-step rendezvous
//! drives the tick, so each completed round advances the world exactly once.
//!
//! # Session end
//!
//! The first advance that reports `false` (or fails) ends the session. The
//! barrier is closed so blocked and future callers return `false` at once,
//! and the driver is never advanced again.
//!
//! # Reconfiguration
//!
//! The party count is guarded by a configuration lock that also counts the
//! parties currently inside a round. `set_party_count` is rejected with
//! [`StepError::RoundInFlight`] while that count is non-zero, so no party can
//! be left waiting on a barrier sized for the old count.

use crate::barrier::{Arrival, StepBarrier};
use crate::error::StepError;
use parking_lot::Mutex;
use simhal_common::config::SessionConfig;
use simhal_common::consts::{DEFAULT_PARTIES, DEFAULT_TICK_PERIOD_MS};
use simhal_common::driver::TickDriver;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Rendezvous group shared by all parties.
#[derive(Debug)]
struct Rendezvous {
    parties: usize,
    barrier: Arc<StepBarrier>,
    /// Parties between entering a round and leaving it.
    in_round: usize,
}

/// Which rendezvous point of a round is being crossed.
#[derive(Debug, Clone, Copy)]
enum Phase {
    PreStep,
    PostStep,
}

/// How a party joined the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Called `drive_one_tick`; always advances the world.
    Stepper,
    /// Called `wait_until_next_tick`; advances only if nobody else will.
    Follower,
}

/// Membership of one party in one round.
///
/// Holds the barrier snapshot taken at entry and releases the in-round
/// count on drop.
struct RoundGuard<'a> {
    coordinator: &'a StepCoordinator,
    parties: usize,
    barrier: Arc<StepBarrier>,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        let mut rendezvous = self.coordinator.rendezvous.lock();
        rendezvous.in_round -= 1;
    }
}

/// Coordinates the stepper and its followers around the external tick.
///
/// Construct one per simulated session and share it as `Arc<StepCoordinator>`.
pub struct StepCoordinator {
    /// Tick driver; only the stepper advances it.
    driver: Mutex<Box<dyn TickDriver>>,
    /// Party count, barrier and in-round count, under the configuration lock.
    rendezvous: Mutex<Rendezvous>,
    /// Tick period for `sleep_for` and the background stepper.
    tick_period_ms: AtomicU64,
    /// Set once an advance reports end of session.
    ended: AtomicBool,
    /// Driver shutdown already performed.
    shut_down: AtomicBool,
    /// Successful external advances.
    ticks: AtomicU64,
    /// Running background steppers.
    background_loops: AtomicUsize,
}

impl StepCoordinator {
    /// Create a coordinator with a single party and the default tick period.
    pub fn new(driver: Box<dyn TickDriver>) -> Self {
        info!(
            "StepCoordinator created: driver={} v{}, tick_duration={:?}",
            driver.name(),
            driver.version(),
            driver.tick_duration()
        );
        Self {
            driver: Mutex::new(driver),
            rendezvous: Mutex::new(Rendezvous {
                parties: DEFAULT_PARTIES,
                barrier: Arc::new(StepBarrier::new(DEFAULT_PARTIES)),
                in_round: 0,
            }),
            tick_period_ms: AtomicU64::new(DEFAULT_TICK_PERIOD_MS),
            ended: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            background_loops: AtomicUsize::new(0),
        }
    }

    /// Create a coordinator configured from a session section.
    ///
    /// # Errors
    /// Returns `StepError::Config` if the session section is invalid.
    pub fn with_config(
        driver: Box<dyn TickDriver>,
        session: &SessionConfig,
    ) -> Result<Self, StepError> {
        session.validate()?;
        let coordinator = Self::new(driver);
        coordinator.set_party_count(session.parties)?;
        coordinator.set_tick_period(session.tick_period_ms)?;
        Ok(coordinator)
    }

    // ─── Tick path ──────────────────────────────────────────────────

    /// Run one full round as the stepper.
    ///
    /// Returns `true` if the tick was applied and the session continues.
    /// Returns `false` without touching the driver once the session has ended.
    pub fn drive_one_tick(&self) -> bool {
        match self.enter_round() {
            Some(round) => self.run_round(&round, Role::Stepper),
            None => false,
        }
    }

    /// Drive up to `count` ticks, stopping at the first failed one.
    pub fn drive_ticks(&self, count: u64) -> bool {
        for _ in 0..count {
            if !self.drive_one_tick() {
                return false;
            }
        }
        true
    }

    /// Block until the world has advanced by exactly one tick.
    ///
    /// With a single party the caller drives the tick itself. With more
    /// parties the stepper drives it; if no party in the round called
    /// `drive_one_tick`, the last one to arrive drives it instead. Returns
    /// `false` once the session has ended, without blocking.
    pub fn wait_until_next_tick(&self) -> bool {
        match self.enter_round() {
            Some(round) => self.run_round(&round, Role::Follower),
            None => false,
        }
    }

    /// Sleep for `duration_ms` of simulated time.
    ///
    /// Waits for `ceil(duration_ms / tick_period)` ticks. Returns `false` as
    /// soon as one wait reports the end of the session.
    pub fn sleep_for(&self, duration_ms: u64) -> bool {
        let ticks = self.ticks_for(duration_ms);
        for _ in 0..ticks {
            if !self.wait_until_next_tick() {
                return false;
            }
        }
        true
    }

    /// Wait tick by tick until `condition` holds.
    ///
    /// The condition is checked before every wait, so it is evaluated
    /// against fresh state after each tick. Returns `false` if the session
    /// ends first.
    pub fn wait_until<F>(&self, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        loop {
            if condition() {
                return true;
            }
            if !self.wait_until_next_tick() {
                return false;
            }
        }
    }

    /// Number of ticks `sleep_for(duration_ms)` waits for.
    pub fn ticks_for(&self, duration_ms: u64) -> u64 {
        duration_ms.div_ceil(self.tick_period_ms())
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Replace the rendezvous group with one sized for `parties`.
    ///
    /// # Errors
    /// - `StepError::InvalidPartyCount` if `parties` is zero
    /// - `StepError::RoundInFlight` if any party is inside a round
    /// - `StepError::SessionEnded` if the session has ended
    pub fn set_party_count(&self, parties: usize) -> Result<(), StepError> {
        if parties == 0 {
            return Err(StepError::InvalidPartyCount(parties));
        }

        let mut rendezvous = self.rendezvous.lock();
        if self.has_ended() {
            return Err(StepError::SessionEnded);
        }
        if rendezvous.in_round > 0 {
            warn!(
                "Rejected party count change {} -> {}: {} parties inside a round",
                rendezvous.parties, parties, rendezvous.in_round
            );
            return Err(StepError::RoundInFlight {
                in_round: rendezvous.in_round,
            });
        }

        rendezvous.barrier = Arc::new(StepBarrier::new(parties));
        if rendezvous.parties != parties {
            info!("Party count changed {} -> {}", rendezvous.parties, parties);
        }
        rendezvous.parties = parties;
        Ok(())
    }

    /// Current number of rendezvous parties.
    pub fn party_count(&self) -> usize {
        self.rendezvous.lock().parties
    }

    /// Set the tick period used by `sleep_for` and the background stepper.
    ///
    /// # Errors
    /// Returns `StepError::InvalidTickPeriod` if `period_ms` is zero.
    pub fn set_tick_period(&self, period_ms: u64) -> Result<(), StepError> {
        if period_ms == 0 {
            return Err(StepError::InvalidTickPeriod(period_ms));
        }
        self.tick_period_ms.store(period_ms, Ordering::Release);
        debug!("Tick period set to {}ms", period_ms);
        Ok(())
    }

    /// Tick period in milliseconds.
    pub fn tick_period_ms(&self) -> u64 {
        self.tick_period_ms.load(Ordering::Acquire)
    }

    /// Tick period as `Duration`.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms())
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// End the session from outside and shut the driver down.
    ///
    /// Blocked parties are released with `false`. Idempotent.
    pub fn shutdown(&self) -> Result<(), StepError> {
        self.end_session();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(
            "Shutting down step coordinator after {} ticks",
            self.ticks()
        );
        self.driver.lock().shutdown()?;
        Ok(())
    }

    /// True until the first failed tick or `shutdown()`.
    pub fn is_running(&self) -> bool {
        !self.has_ended()
    }

    /// Number of successful external advances.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Simulated time covered by one driver tick.
    pub fn tick_duration(&self) -> Duration {
        self.driver.lock().tick_duration()
    }

    pub(crate) fn register_background_loop(&self) -> usize {
        self.background_loops.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn unregister_background_loop(&self) {
        self.background_loops.fetch_sub(1, Ordering::AcqRel);
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Join the current round, or `None` if the session has ended.
    fn enter_round(&self) -> Option<RoundGuard<'_>> {
        let mut rendezvous = self.rendezvous.lock();
        if self.has_ended() {
            return None;
        }
        rendezvous.in_round += 1;
        Some(RoundGuard {
            coordinator: self,
            parties: rendezvous.parties,
            barrier: Arc::clone(&rendezvous.barrier),
        })
    }

    /// One round: pre-step rendezvous, advance by whoever drives, post-step.
    fn run_round(&self, round: &RoundGuard<'_>, role: Role) -> bool {
        let drives = if round.parties == 1 {
            true
        } else {
            let arrival = match role {
                Role::Stepper => round.barrier.arrive_claiming(),
                Role::Follower => round.barrier.arrive(),
            };
            match arrival {
                Arrival::Leader { claimed } => role == Role::Stepper || !claimed,
                Arrival::Follower => role == Role::Stepper,
                Arrival::Closed => return self.rendezvous_closed(Phase::PreStep),
            }
        };

        if !drives {
            // The driving party advances the world between the two rendezvous points.
            return self.cross_post_step(round) && !self.has_ended();
        }

        // shutdown() may have landed while we waited for the other parties.
        let alive = !self.has_ended() && self.advance();
        if !alive {
            self.ended.store(true, Ordering::Release);
        }

        let released = self.cross_post_step(round);
        if !alive {
            self.end_session();
        }
        alive && released
    }

    /// Post-step rendezvous. Single-party rounds never block.
    fn cross_post_step(&self, round: &RoundGuard<'_>) -> bool {
        if round.parties == 1 {
            return true;
        }
        match round.barrier.arrive() {
            Arrival::Leader { .. } | Arrival::Follower => true,
            Arrival::Closed => self.rendezvous_closed(Phase::PostStep),
        }
    }

    /// A closed barrier means the session ended; only `end_session` closes it.
    fn rendezvous_closed(&self, phase: Phase) -> bool {
        debug_assert!(self.has_ended());
        debug!("Rendezvous closed at {:?}: session ended", phase);
        false
    }

    /// Invoke the driver once. Errors and panics count as a failed tick.
    fn advance(&self) -> bool {
        let mut driver = self.driver.lock();
        match panic::catch_unwind(AssertUnwindSafe(|| driver.advance_one_tick())) {
            Ok(Ok(true)) => {
                let ticks = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
                if ticks % 1000 == 0 {
                    debug!("Step coordinator: {} ticks", ticks);
                }
                true
            }
            Ok(Ok(false)) => {
                info!(
                    "Driver '{}' reported end of session after {} ticks",
                    driver.name(),
                    self.ticks()
                );
                false
            }
            Ok(Err(e)) => {
                error!("Tick failed in driver '{}': {}", driver.name(), e);
                false
            }
            Err(payload) => {
                error!(
                    "Driver '{}' panicked during tick: {}",
                    driver.name(),
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }

    /// Mark the session ended and release every blocked party.
    fn end_session(&self) {
        let rendezvous = self.rendezvous.lock();
        self.ended.store(true, Ordering::Release);
        rendezvous.barrier.close();
    }
}

impl std::fmt::Debug for StepCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepCoordinator")
            .field("parties", &self.party_count())
            .field("tick_period_ms", &self.tick_period_ms())
            .field("ticks", &self.ticks())
            .field("running", &self.is_running())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

static_assertions::assert_impl_all!(StepCoordinator: Send, Sync);
static_assertions::assert_impl_all!(StepBarrier: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use simhal_common::driver::DriverError;
    use std::sync::mpsc;
    use std::thread;

    /// Driver that counts calls and ends the session on a chosen call.
    struct ScriptedDriver {
        calls: Arc<AtomicU64>,
        end_on: Option<u64>,
        fault: Fault,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Fault {
        None,
        Error,
        Panic,
    }

    impl ScriptedDriver {
        fn boxed(end_on: Option<u64>, fault: Fault) -> (Box<dyn TickDriver>, Arc<AtomicU64>) {
            let calls = Arc::new(AtomicU64::new(0));
            let driver = Self {
                calls: Arc::clone(&calls),
                end_on,
                fault,
            };
            (Box::new(driver), calls)
        }
    }

    impl TickDriver for ScriptedDriver {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn tick_duration(&self) -> Duration {
            Duration::from_millis(32)
        }

        fn advance_one_tick(&mut self) -> Result<bool, DriverError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.end_on {
                match self.fault {
                    Fault::None => return Ok(false),
                    Fault::Error => {
                        return Err(DriverError::CommunicationError("lost".into()));
                    }
                    Fault::Panic => panic!("simulator crashed"),
                }
            }
            Ok(true)
        }
    }

    fn run_with_timeout<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(f());
        });
        rx.recv_timeout(Duration::from_secs(10))
            .expect("operation hung")
    }

    #[test]
    fn single_party_wait_drives_exactly_one_tick() {
        let (driver, calls) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = StepCoordinator::new(driver);

        assert!(coordinator.wait_until_next_tick());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.ticks(), 1);
    }

    #[test]
    fn drive_ticks_stops_at_first_failure() {
        let (driver, calls) = ScriptedDriver::boxed(Some(3), Fault::None);
        let coordinator = StepCoordinator::new(driver);

        assert!(!coordinator.drive_ticks(5));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(coordinator.ticks(), 2);
    }

    #[test]
    fn driver_error_is_a_failed_tick() {
        let (driver, calls) = ScriptedDriver::boxed(Some(1), Fault::Error);
        let coordinator = StepCoordinator::new(driver);

        assert!(!coordinator.drive_one_tick());
        assert!(!coordinator.is_running());
        assert!(!coordinator.drive_one_tick());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn driver_panic_is_a_failed_tick() {
        let (driver, calls) = ScriptedDriver::boxed(Some(2), Fault::Panic);
        let coordinator = StepCoordinator::new(driver);

        assert!(coordinator.drive_one_tick());
        assert!(!coordinator.drive_one_tick());
        assert!(!coordinator.wait_until_next_tick());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sleep_quantizes_up_to_whole_ticks() {
        let (driver, calls) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = StepCoordinator::new(driver);
        coordinator.set_tick_period(500).unwrap();

        assert_eq!(coordinator.ticks_for(1200), 3);
        assert!(coordinator.sleep_for(1200));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert!(coordinator.sleep_for(0));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert!(coordinator.sleep_for(500));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn sleep_stops_when_session_ends() {
        let (driver, calls) = ScriptedDriver::boxed(Some(2), Fault::None);
        let coordinator = StepCoordinator::new(driver);
        coordinator.set_tick_period(100).unwrap();

        assert!(!coordinator.sleep_for(1000));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wait_until_checks_condition_between_ticks() {
        let (driver, calls) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = StepCoordinator::new(driver);

        let probe = Arc::clone(&calls);
        assert!(coordinator.wait_until(|| probe.load(Ordering::SeqCst) >= 4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // Already satisfied: no tick.
        assert!(coordinator.wait_until(|| true));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let (driver, _) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = StepCoordinator::new(driver);

        assert!(matches!(
            coordinator.set_party_count(0),
            Err(StepError::InvalidPartyCount(0))
        ));
        assert!(matches!(
            coordinator.set_tick_period(0),
            Err(StepError::InvalidTickPeriod(0))
        ));
        assert_eq!(coordinator.party_count(), 1);
        assert_eq!(coordinator.tick_period_ms(), DEFAULT_TICK_PERIOD_MS);
    }

    #[test]
    fn with_config_applies_session() {
        let (driver, _) = ScriptedDriver::boxed(None, Fault::None);
        let session = SessionConfig {
            parties: 3,
            tick_period_ms: 250,
            ..SessionConfig::default()
        };
        let coordinator = StepCoordinator::with_config(driver, &session).unwrap();
        assert_eq!(coordinator.party_count(), 3);
        assert_eq!(coordinator.tick_period(), Duration::from_millis(250));
    }

    #[test]
    fn reconfiguration_rejected_while_party_waits() {
        let (driver, _) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = Arc::new(StepCoordinator::new(driver));
        coordinator.set_party_count(2).unwrap();

        let follower = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.wait_until_next_tick())
        };

        // Wait for the follower to block at the pre-step rendezvous.
        while coordinator.rendezvous.lock().barrier.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(
            coordinator.set_party_count(3),
            Err(StepError::RoundInFlight { in_round: 1 })
        ));
        assert_eq!(coordinator.party_count(), 2);

        let stepper = Arc::clone(&coordinator);
        assert!(run_with_timeout(move || stepper.drive_one_tick()));
        assert!(follower.join().unwrap());

        // Idle again: reconfiguration allowed.
        assert!(coordinator.set_party_count(3).is_ok());
    }

    #[test]
    fn shutdown_releases_blocked_follower() {
        let (driver, calls) = ScriptedDriver::boxed(None, Fault::None);
        let coordinator = Arc::new(StepCoordinator::new(driver));
        coordinator.set_party_count(2).unwrap();

        let follower = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.wait_until_next_tick())
        };
        while coordinator.rendezvous.lock().barrier.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        coordinator.shutdown().unwrap();
        assert!(!follower.join().unwrap());
        assert!(!coordinator.drive_one_tick());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            coordinator.set_party_count(1),
            Err(StepError::SessionEnded)
        ));
        // Second shutdown is a no-op.
        assert!(coordinator.shutdown().is_ok());
    }
}
