use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;
use tronadapt_config::{ClockConfig, TesterConfig, TronConfig};
use tronadapt_core::{fatal, VirtualRuntime};
use tronadapt_reporter::{Reporter, RECEIVER_THREAD};

use crate::chip::{Chip, PASS_TIMEOUT};
use crate::io_handler::IoHandler;

#[derive(Parser, Debug)]
#[command(version, about = "Sample test adapter for online testing in real or virtual time")]
pub struct Cli {
    /// Configuration file. Without it `config/tronadapt.yaml` is used when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Follow the virtual clock coordinator at HOST:PORT.
    #[arg(short = 'C', long = "clock", value_name = "HOST:PORT", value_parser = parse_endpoint)]
    pub clock: Option<Endpoint>,

    /// Accept tester connections on PORT.
    #[arg(long, value_name = "PORT", conflicts_with = "connect")]
    pub listen: Option<u16>,

    /// Dial a tester listening at HOST:PORT.
    #[arg(long, value_name = "HOST:PORT", value_parser = parse_endpoint)]
    pub connect: Option<Endpoint>,

    /// Base log level, e.g. `info` or `debug`.
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

fn parse_endpoint(value: &str) -> Result<Endpoint, String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got `{value}`"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("`{port}` is not a port number"))?;
    if host.is_empty() || port == 0 {
        return Err(format!("`{value}` is not a usable endpoint"));
    }
    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

impl Cli {
    /// Loads the configuration and applies the command line on top.
    pub fn load_config(&self) -> anyhow::Result<TronConfig> {
        let mut config = match &self.config {
            Some(path) => TronConfig::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TronConfig::load().context("loading configuration")?,
        };
        self.apply(&mut config);
        config.checked().context("command line overrides")
    }

    fn apply(&self, config: &mut TronConfig) {
        if let Some(clock) = &self.clock {
            config.clock = ClockConfig {
                host: Some(clock.host.clone()),
                port: clock.port,
                ..config.clock.clone()
            };
        }
        if let Some(port) = self.listen {
            config.tester = TesterConfig {
                reconnect_delay_ms: config.tester.reconnect_delay_ms,
                ..TesterConfig::listen(port)
            };
        }
        if let Some(tester) = &self.connect {
            config.tester = TesterConfig {
                reconnect_delay_ms: config.tester.reconnect_delay_ms,
                ..TesterConfig::dial(tester.host.clone(), tester.port)
            };
        }
        if let Some(level) = &self.log_level {
            config.telemetry.level = level.clone();
        }
    }
}

/// Runs the sample chip adapter until the reporter stops.
pub fn run(config: &TronConfig) -> anyhow::Result<()> {
    let runtime = VirtualRuntime::new(config.clock.clone());

    let (chip, _chip_thread) = Chip::spawn(&runtime, PASS_TIMEOUT).context("starting chip")?;
    let (handler, _input_thread) =
        IoHandler::spawn(&runtime, chip.clone()).context("starting input handler")?;
    chip.set_listener(handler.clone());

    let (_reporter, served) = match Reporter::spawn(&runtime, &config.tester, handler) {
        Ok(started) => started,
        Err(e) if e.is_fatal() => fatal(RECEIVER_THREAD, &e),
        Err(e) => return Err(e).context("starting reporter"),
    };

    match served.join() {
        Ok(Ok(())) => {
            info!("Chip terminated");
            Ok(())
        }
        Ok(Err(e)) => fatal(RECEIVER_THREAD, &e),
        Err(_) => Err(anyhow!("reporter thread panicked")),
    }
}
