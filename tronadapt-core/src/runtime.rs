//! ## tronadapt-core::runtime
//! **Thread factory for the virtual time framework**
//!
//! The coordinator address is fixed when the runtime is built and read by
//! every thread created through it afterwards. A runtime without a
//! coordinator produces real-time threads whose locks and conditions are
//! purely local.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};
use tronadapt_config::ClockConfig;

use crate::client::ClockClient;
use crate::error::ClockError;
use crate::thread::VirtualThread;

/// Creates [`VirtualThread`]s that all obey the same clock.
#[derive(Debug, Clone)]
pub struct VirtualRuntime {
    config: Arc<ClockConfig>,
}

impl VirtualRuntime {
    pub fn new(config: ClockConfig) -> Self {
        if let Some(endpoint) = config.coordinator() {
            info!("Using virtual clock at {endpoint}");
        }
        Self {
            config: Arc::new(config),
        }
    }

    /// Runtime driven by the host clock.
    pub fn realtime() -> Self {
        Self::new(ClockConfig::realtime())
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn is_virtual(&self) -> bool {
        self.config.is_virtual()
    }

    /// Creates a thread handle for the calling OS thread, connecting it to
    /// the coordinator when one is configured.
    pub fn try_enter(&self, name: impl Into<String>) -> Result<VirtualThread, ClockError> {
        let name = name.into();
        let clock = match self.config.coordinator() {
            Some(endpoint) => Some(ClockClient::connect(
                &endpoint,
                &name,
                self.config.connect_attempts,
                self.config.retry_delay(),
            )?),
            None => None,
        };
        Ok(VirtualThread::new(name, clock))
    }

    /// Like [`try_enter`](Self::try_enter), but a thread that cannot reach
    /// its clock terminates the process.
    pub fn enter(&self, name: impl Into<String>) -> VirtualThread {
        let name = name.into();
        match self.try_enter(name.clone()) {
            Ok(thread) => thread,
            Err(e) => fatal(&format!("{name} cannot reach the clock"), &e),
        }
    }

    /// Spawns an OS thread running `body` as a virtual thread.
    ///
    /// The coordinator connection is made before the thread starts. When
    /// `body` returns the thread leaves virtual time.
    pub fn spawn<F, T>(&self, name: impl Into<String>, body: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce(&VirtualThread) -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        let vthread = self.enter(name.clone());
        thread::Builder::new().name(name).spawn(move || {
            let out = body(&vthread);
            vthread.quit();
            out
        })
    }
}

/// Logs `err` and terminates the process with status 1.
pub fn fatal(context: &str, err: &dyn std::error::Error) -> ! {
    error!("{context}: {err}");
    eprintln!("{context}: {err}");
    std::process::exit(1)
}
