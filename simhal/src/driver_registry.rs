//! Driver registry for tick drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving tick
//! driver factories. The registry is constructed at startup and passed by
//! value; there is no global state.

use simhal_common::config::SimulationConfig;
use simhal_common::driver::{DriverError, DriverFactory, TickDriver};
use std::collections::HashMap;
use tracing::debug;

use crate::drivers::register_builtin_drivers;

/// Registry of available tick drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry populated with the built-in drivers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        register_builtin_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `DriverError::DriverNotFound` naming the registered drivers if
    /// `name` is unknown, or whatever the factory reports.
    pub fn create_driver(
        &self,
        name: &str,
        config: &SimulationConfig,
    ) -> Result<Box<dyn TickDriver>, DriverError> {
        let Some(factory) = self.factories.get(name) else {
            return Err(DriverError::DriverNotFound(format!(
                "'{name}' (available: {})",
                self.list_drivers().join(", ")
            )));
        };
        debug!("Creating tick driver '{}'", name);
        factory(config)
    }

    /// Registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
