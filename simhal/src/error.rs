//! Step coordinator error types.
//!
//! Only configuration and lifecycle calls return these. The tick path
//! itself reports a plain `bool` "keep going" signal.

use simhal_common::config::ConfigError;
use simhal_common::driver::DriverError;
use thiserror::Error;

/// Errors raised by step coordinator configuration and lifecycle calls.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// Party count must be at least one.
    #[error("Invalid party count: {0} (must be >= 1)")]
    InvalidPartyCount(usize),

    /// Tick period must be positive.
    #[error("Invalid tick period: {0}ms (must be > 0)")]
    InvalidTickPeriod(u64),

    /// Reconfiguration attempted while parties are inside a round.
    #[error("Cannot reconfigure rendezvous: {in_round} parties inside a round")]
    RoundInFlight {
        /// Parties between pre-step entry and post-step exit.
        in_round: usize,
    },

    /// The session has already ended.
    #[error("Session has ended")]
    SessionEnded,

    /// Background stepper thread could not be started.
    #[error("Failed to spawn background stepper: {0}")]
    Spawn(String),

    /// Background stepper thread panicked.
    #[error("Background stepper panicked")]
    BackgroundPanicked,

    /// Invalid session configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Driver could not be created or shut down.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
