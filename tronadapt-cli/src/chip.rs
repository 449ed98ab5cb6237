//! ## tronadapt-cli::chip
//! **Sample implementation under test**
//!
//! A two-location automaton: in `Wait` it sleeps until started, in `Pass`
//! it emits `stop` after one second without further input and goes back to
//! `Wait`. The chip holds its lock for its whole life and only lets go of it
//! while waiting on its condition.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tronadapt_core::{MonitorError, VirtualCondition, VirtualLock, VirtualRuntime, VirtualThread};

/// Time spent in `Pass` before `stop` is emitted.
pub const PASS_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives the chip's outputs.
pub trait ChipListener: Send + Sync {
    fn report_stop(&self);
    fn disconnect(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Wait,
    Pass,
}

pub struct Chip {
    lock: VirtualLock,
    cond: VirtualCondition,
    // Guarded by `lock`.
    location: Mutex<Location>,
    running: AtomicBool,
    listener: Mutex<Option<Arc<dyn ChipListener>>>,
}

impl Chip {
    /// Starts the chip on its own thread and returns once it holds its lock.
    pub fn spawn(
        runtime: &VirtualRuntime,
        pass_timeout: Duration,
    ) -> io::Result<(Arc<Chip>, JoinHandle<()>)> {
        let (ready_tx, ready) = bounded(1);
        let handle = runtime.spawn("Chip", move |me: &VirtualThread| {
            let lock = VirtualLock::named(me, "ChipLock");
            let cond = lock.new_condition(me);
            lock.lock(me);
            let chip = Arc::new(Chip {
                lock,
                cond,
                location: Mutex::new(Location::Wait),
                running: AtomicBool::new(true),
                listener: Mutex::new(None),
            });
            if ready_tx.send(chip.clone()).is_err() {
                return;
            }
            if let Err(e) = chip.execute(me, pass_timeout) {
                warn!("Chip stopped: {e}");
            }
            if let Some(listener) = chip.listener() {
                listener.disconnect();
            }
            let _ = chip.lock.unlock(me);
        })?;
        let chip = ready
            .recv()
            .map_err(|_| io::Error::other("chip thread exited before starting"))?;
        Ok((chip, handle))
    }

    pub fn set_listener(&self, listener: Arc<dyn ChipListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn ChipListener>> {
        self.listener.lock().clone()
    }

    pub fn location(&self) -> Location {
        *self.location.lock()
    }

    fn execute(&self, me: &VirtualThread, pass_timeout: Duration) -> Result<(), MonitorError> {
        info!("Chip started");
        while self.running.load(Ordering::Acquire) {
            match self.location() {
                Location::Wait => self.cond.wait(me)?,
                Location::Pass => {
                    if !self.cond.wait_timeout(me, pass_timeout)? {
                        if let Some(listener) = self.listener() {
                            listener.report_stop();
                        }
                        *self.location.lock() = Location::Wait;
                    }
                }
            }
        }
        Ok(())
    }

    /// Input `start`: moves a waiting chip to `Pass`.
    pub fn start(&self, caller: &VirtualThread) -> Result<(), MonitorError> {
        self.lock.lock(caller);
        {
            let mut location = self.location.lock();
            if *location == Location::Wait {
                debug!("Chip passing");
                *location = Location::Pass;
                self.cond.signal_all(caller)?;
            }
        }
        self.lock.unlock(caller)
    }

    /// Ends the chip's loop.
    pub fn stop(&self, caller: &VirtualThread) -> Result<(), MonitorError> {
        self.lock.lock(caller);
        self.running.store(false, Ordering::Release);
        self.cond.signal_all(caller)?;
        self.lock.unlock(caller)
    }
}
