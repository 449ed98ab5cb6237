//! Virtual clock coordinator settings.
//!
//! A configured `host` switches every thread created afterwards into
//! virtual-time mode. Without it the host clock is used.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Clock coordinator endpoint and connection policy.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    /// Coordinator host; `None` selects real time.
    #[serde(default)]
    #[validate(custom(function = validation::validate_host))]
    pub host: Option<String>,

    /// Coordinator port.
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Connection attempts per thread before giving up.
    #[serde(default = "default_connect_attempts")]
    #[validate(range(min = 1, max = 1000))]
    pub connect_attempts: u32,

    /// Pause between refused connection attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_port() -> u16 {
    6521
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ClockConfig {
    /// Real-time configuration with no coordinator.
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Virtual-time configuration pointing at `host:port`.
    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            ..Self::default()
        }
    }

    /// True when a coordinator is configured.
    pub fn is_virtual(&self) -> bool {
        self.host.is_some()
    }

    /// `host:port` of the coordinator, if any.
    pub fn coordinator(&self) -> Option<String> {
        self.host.as_ref().map(|host| format!("{}:{}", host, self.port))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
