//! ## tronadapt-cli
//! **Sample adapter binary**
//!
//! Serves a TRON-style tester with the bundled chip model, in real time or
//! following a virtual clock coordinator (`-C HOST:PORT`).
//!
//! ```text
//! tronadapt --listen 9999
//! tronadapt -C localhost:6521 --connect localhost:9999
//! ```

use clap::Parser;
use tronadapt_telemetry::logging::EventLogger;

mod chip;
mod commands;
mod io_handler;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    EventLogger::init(&config.telemetry);
    EventLogger::log_startup(&config);

    commands::run(&config)?;
    // Threads still blocked on the clock or the chip do not outlive the
    // reporter.
    std::process::exit(0)
}
