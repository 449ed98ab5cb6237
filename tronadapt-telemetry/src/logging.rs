//! ## tronadapt-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! Debug output is toggled per subsystem by named environment flags whose
//! presence alone counts, their values are ignored:
//!
//! - `DEBUG_THREADS`: lock, condition and clock traffic (`tronadapt_core`)
//! - `DEBUG_REPORTER`: tester traffic (`tronadapt_reporter`)

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use tronadapt_config::{TelemetryConfig, TronConfig};

pub const DEBUG_THREADS: &str = "DEBUG_THREADS";
pub const DEBUG_REPORTER: &str = "DEBUG_REPORTER";

/// Per-subsystem debug switches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebugFlags {
    pub threads: bool,
    pub reporter: bool,
}

impl DebugFlags {
    pub fn from_env() -> Self {
        Self {
            threads: std::env::var_os(DEBUG_THREADS).is_some(),
            reporter: std::env::var_os(DEBUG_REPORTER).is_some(),
        }
    }

    /// Flags raised by either the environment or the configuration.
    pub fn merged(self, config: &TelemetryConfig) -> Self {
        Self {
            threads: self.threads || config.debug_threads,
            reporter: self.reporter || config.debug_reporter,
        }
    }

    /// Filter directives for the given base level.
    pub fn directives(&self, level: &str) -> String {
        let mut directives = level.to_lowercase();
        if self.threads {
            directives.push_str(",tronadapt_core=debug");
        }
        if self.reporter {
            directives.push_str(",tronadapt_reporter=debug");
        }
        directives
    }
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over the configured
    /// level; the debug flags are applied on top of either.
    pub fn init(config: &TelemetryConfig) {
        let flags = DebugFlags::from_env().merged(config);
        let base = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
        let filter = EnvFilter::try_new(flags.directives(&base))
            .unwrap_or_else(|_| EnvFilter::new(flags.directives("info")));

        // A second initialisation (tests, embedding) keeps the first subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Logs the effective runtime mode once at startup.
    pub fn log_startup(config: &TronConfig) {
        let clock = config
            .clock
            .coordinator()
            .unwrap_or_else(|| "host clock".to_string());
        info!(
            clock = %clock,
            tester_mode = ?config.tester.mode,
            tester_port = config.tester.port,
            "Adapter runtime starting"
        );
    }
}
