//! SimHAL Common Library
//!
//! This crate provides shared constants, configuration loading utilities and
//! the tick driver contract for all simhal workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Service name and configuration defaults
//! - [`config`] - Configuration loading traits and types
//! - [`driver`] - `TickDriver` trait and driver error types
//!
//! # Usage
//!
//! ```rust
//! use simhal_common::config::{ConfigLoader, SimHalConfig};
//! use simhal_common::driver::TickDriver;
//! ```

pub mod config;
pub mod consts;
pub mod driver;
