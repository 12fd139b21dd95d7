//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the simhal TOML
//! configuration file and validate the session parameters before any
//! coordinator or driver is constructed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use simhal_common::config::{ConfigLoader, ConfigError, SimHalConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = SimHalConfig::load(Path::new("simhal.toml"))?;
//!     config.validate()?;
//!     println!("Parties: {}", config.session.parties);
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "simhal-lab-01"
//!
//! [session]
//! driver = "simulation"
//! parties = 2
//! tick_period_ms = 500
//!
//! [simulation]
//! tick_duration_ms = 32
//! max_ticks = 1000
//! realtime = false
//! ```

use crate::consts::{
    DEFAULT_PARTIES, DEFAULT_TICK_DURATION_MS, DEFAULT_TICK_PERIOD_MS, SIMHAL_SERVICE_NAME,
    SIMULATION_DRIVER_NAME,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across simhal applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

/// Step-synchronization session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the tick driver to load from the registry.
    pub driver: String,
    /// Number of rendezvous parties (stepper included).
    pub parties: usize,
    /// Tick period used by `sleep_for`, in milliseconds.
    pub tick_period_ms: u64,
    /// Start a background stepper with this period, in milliseconds.
    pub background_period_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver: SIMULATION_DRIVER_NAME.to_string(),
            parties: DEFAULT_PARTIES,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            background_period_ms: None,
        }
    }
}

impl SessionConfig {
    /// Validate the session parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `driver` is empty
    /// - `parties` is zero
    /// - `tick_period_ms` is zero
    /// - `background_period_ms` is present but zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "session.driver cannot be empty".to_string(),
            ));
        }
        if self.parties == 0 {
            return Err(ConfigError::ValidationError(
                "session.parties must be at least 1".to_string(),
            ));
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session.tick_period_ms must be positive".to_string(),
            ));
        }
        if self.background_period_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "session.background_period_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the built-in simulated world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated time covered by one tick, in milliseconds.
    pub tick_duration_ms: u64,
    /// End the session after this many ticks. `None` runs until stopped.
    pub max_ticks: Option<u64>,
    /// Pace each tick to wall-clock time (one tick duration per advance).
    pub realtime: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_duration_ms: DEFAULT_TICK_DURATION_MS,
            max_ticks: None,
            realtime: false,
        }
    }
}

impl SimulationConfig {
    /// Tick duration as `Duration`.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_duration_ms)
    }

    /// Validate the simulation parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `tick_duration_ms` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration_ms == 0 {
            return Err(ConfigError::ValidationError(
                "simulation.tick_duration_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete simhal configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimHalConfig {
    /// Shared application settings.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Step-synchronization session.
    #[serde(default)]
    pub session: SessionConfig,
    /// Built-in simulation driver.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl SimHalConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.session.validate()?;
        self.simulation.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_service_name() -> String {
    SIMHAL_SERVICE_NAME.to_string()
}
