//! # tronadapt Telemetry
//!
//! Crate for logging setup and the environment debug switches.

pub mod logging;

pub use logging::{DebugFlags, EventLogger};
