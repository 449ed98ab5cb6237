//! Logging configuration.
//!
//! The debug switches are OR-ed with the `DEBUG_THREADS` and
//! `DEBUG_REPORTER` environment flags by the telemetry crate.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    #[validate(custom(function = validation::validate_level))]
    pub level: String,

    /// Log lock, condition and clock traffic.
    #[serde(default)]
    pub debug_threads: bool,

    /// Log tester traffic.
    #[serde(default)]
    pub debug_reporter: bool,
}

fn default_level() -> String {
    "info".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            debug_threads: false,
            debug_reporter: false,
        }
    }
}
