//! # tronadapt Configuration System
//!
//! Hierarchical configuration for the adapter runtime: where the virtual
//! clock coordinator lives, how the tester connects, and how verbose the
//! logs are.
//!
//! ## Features
//! - **Unified Configuration**: one value handed to the thread factory and
//!   the reporter at startup, never mutated afterwards
//! - **Validation**: runtime validation of ports, hosts and log levels
//! - **Environment Awareness**: `TRONADAPT_*` overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod clock;
mod error;
mod telemetry;
mod tester;
mod validation;

pub use clock::ClockConfig;
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;
pub use tester::{TesterConfig, TesterMode};

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq, Eq)]
pub struct TronConfig {
    /// Virtual clock coordinator.
    #[serde(default)]
    #[validate(nested)]
    pub clock: ClockConfig,

    /// Tester endpoint.
    #[serde(default)]
    #[validate(nested)]
    pub tester: TesterConfig,

    /// Logging.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl TronConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/tronadapt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides.
    /// 4. `TRONADAPT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TronConfig::default()));

        if Path::new("config/tronadapt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/tronadapt.yaml"));
        }

        let env = std::env::var("TRONADAPT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific path, still honouring the
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound(PathBuf::from(path)));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: PathBuf::from(path),
                    source,
                })
            }
        }

        let figment =
            Figment::from(Serialized::defaults(TronConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("TRONADAPT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(Self::checked)
    }

    /// Validates a configuration assembled or modified in code, such as
    /// one with command line overrides applied.
    pub fn checked(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn default_config_is_realtime_listener() {
        let config = TronConfig::default();
        config.validate().expect("Default config should validate");
        assert!(!config.clock.is_virtual());
        assert_eq!(config.tester.mode, TesterMode::Listen);
        assert_eq!(config.tester.port, 9999);
        assert_eq!(config.clock.connect_attempts, 10);
    }

    #[test]
    fn environment_selects_virtual_clock() {
        Jail::expect_with(|jail| {
            jail.set_env("TRONADAPT_CLOCK__HOST", "localhost");
            jail.set_env("TRONADAPT_CLOCK__PORT", "6521");
            let config = TronConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(
                config.clock.coordinator().as_deref(),
                Some("localhost:6521")
            );
            Ok(())
        });
    }

    #[test]
    fn file_configures_dialing_tester() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tronadapt.yaml",
                r#"
                tester:
                  mode: dial
                  host: tester.local
                  port: 7000
                "#,
            )?;
            let config = TronConfig::load_from_path("tronadapt.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.tester, TesterConfig::dial("tester.local", 7000));
            assert_eq!(config.clock, ClockConfig::realtime());
            Ok(())
        });
    }

    #[test]
    fn zero_port_fails_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("TRONADAPT_TESTER__PORT", "0");
            match TronConfig::load() {
                Err(ConfigError::Validation(_)) => Ok(()),
                other => Err(format!("unexpected result: {:?}", other).into()),
            }
        });
    }

    #[test]
    fn unreadable_path_is_an_io_error() {
        Jail::expect_with(|jail| {
            jail.create_file("tronadapt.yaml", "tester:\n  port: 7000\n")?;
            // A regular file cannot contain another one.
            match TronConfig::load_from_path("tronadapt.yaml/nested.yaml") {
                Err(ConfigError::Io { path, .. }) => {
                    assert_eq!(path, PathBuf::from("tronadapt.yaml/nested.yaml"));
                    Ok(())
                }
                other => Err(format!("unexpected result: {:?}", other).into()),
            }
        });
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            TronConfig::load_from_path("does/not/exist.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
