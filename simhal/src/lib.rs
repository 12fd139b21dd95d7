//! # SimHAL Library
//!
//! Step-synchronized hardware abstraction shim that lets robot-control
//! programs written against an embedded device API run unmodified against
//! a physics simulator.
//!
//! Device adapters and robot threads share one [`StepCoordinator`]. The
//! simulated world only advances when the stepper drives a tick, and every
//! registered party observes tick boundaries in strict lockstep.
//!
//! # Module Structure
//!
//! - [`barrier`] - Reusable, closable rendezvous barrier
//! - [`coordinator`] - StepCoordinator: tick rounds, sleep, reconfiguration
//! - [`background`] - Background stepper thread
//! - [`driver_registry`] - Tick driver factory registration
//! - [`drivers`] - Tick driver implementations
//! - [`error`] - Coordinator error types
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          simhal                               │
//! │  ┌─────────────┐   wait_until_next_tick   ┌────────────────┐  │
//! │  │  Followers  │─────────────────────────►│                │  │
//! │  │ (sensors,   │                          │ StepCoordinator│  │
//! │  │  motors)    │◄─────── StepBarrier ────►│                │  │
//! │  └─────────────┘                          └───────┬────────┘  │
//! │  ┌─────────────┐      drive_one_tick              │           │
//! │  │   Stepper   │──────────────────────────────────┤           │
//! │  └─────────────┘                                  ▼           │
//! │                                          ┌────────────────┐   │
//! │                                          │  TickDriver    │   │
//! │                                          │  (trait object)│   │
//! │                                          └────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod background;
pub mod barrier;
pub mod coordinator;
pub mod driver_registry;
pub mod drivers;
pub mod error;

// Re-export key types for convenience
pub use crate::background::BackgroundStepper;
pub use crate::barrier::{Arrival, StepBarrier};
pub use crate::coordinator::StepCoordinator;
pub use crate::driver_registry::DriverRegistry;
pub use crate::error::StepError;
