//! Tester connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// How the tester connection is established.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TesterMode {
    /// Listen on `port` and accept one tester at a time.
    #[default]
    Listen,
    /// Dial a tester listening at `host:port`.
    Dial,
}

/// Tester endpoint configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct TesterConfig {
    #[serde(default)]
    pub mode: TesterMode,

    /// Tester host, used when dialing.
    #[serde(default = "default_host")]
    #[validate(custom(function = validation::validate_host))]
    pub host: String,

    /// Port to listen on or to dial.
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Pause before dialing again after a refused connection.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    9999
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            mode: TesterMode::default(),
            host: default_host(),
            port: default_port(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl TesterConfig {
    /// Accept testers on `port`.
    pub fn listen(port: u16) -> Self {
        Self {
            mode: TesterMode::Listen,
            port,
            ..Self::default()
        }
    }

    /// Dial a tester at `host:port`.
    pub fn dial(host: impl Into<String>, port: u16) -> Self {
        Self {
            mode: TesterMode::Dial,
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
