//! ## tronadapt-cli::io_handler
//! **Adapter translating tester actions into chip calls and back**
//!
//! Inputs arrive on the reporter thread and are only queued there. A
//! separate `TestInput` thread drains the queue and drives the chip, so the
//! reporter never blocks on the implementation under test.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tronadapt_core::{MonitorError, VirtualCondition, VirtualLock, VirtualRuntime, VirtualThread};
use tronadapt_protocols::ChannelId;
use tronadapt_reporter::{Adapter, Reporter, ReporterError};

use crate::chip::{Chip, ChipListener};

/// Model time unit the chip model is written against.
pub const TIME_UNIT: Duration = Duration::from_micros(200);
/// Test length in model time units.
pub const TIMEOUT_UNITS: i32 = 100_000;

/// Input channel ids waiting for the `TestInput` thread.
struct InputQueue {
    lock: VirtualLock,
    cond: VirtualCondition,
    // Guarded by `lock`.
    items: Mutex<VecDeque<ChannelId>>,
    closed: AtomicBool,
}

/// Channel ids assigned by the tester on the current connection.
#[derive(Default)]
struct Channels {
    start: AtomicI32,
    stop: AtomicI32,
}

pub struct IoHandler {
    queue: Arc<InputQueue>,
    channels: Arc<Channels>,
    reporter: Mutex<Option<Reporter>>,
}

impl IoHandler {
    /// Starts the `TestInput` thread feeding `chip`.
    pub fn spawn(
        runtime: &VirtualRuntime,
        chip: Arc<Chip>,
    ) -> io::Result<(Arc<IoHandler>, JoinHandle<()>)> {
        let channels = Arc::new(Channels::default());
        let (ready_tx, ready) = bounded(1);
        let handle = runtime.spawn("TestInput", {
            let channels = channels.clone();
            move |me: &VirtualThread| {
                let lock = VirtualLock::named(me, "InputQueue");
                let cond = lock.new_condition(me);
                let queue = Arc::new(InputQueue {
                    lock,
                    cond,
                    items: Mutex::new(VecDeque::new()),
                    closed: AtomicBool::new(false),
                });
                if ready_tx.send(queue.clone()).is_err() {
                    return;
                }
                debug!("Waiting for inputs");
                if let Err(e) = drain(me, &queue, &channels, &chip) {
                    warn!("Input handler stopped: {e}");
                }
                info!("Stopped listening for inputs");
            }
        })?;
        let queue = ready
            .recv()
            .map_err(|_| io::Error::other("input handler exited before starting"))?;
        let handler = Arc::new(IoHandler {
            queue,
            channels,
            reporter: Mutex::new(None),
        });
        Ok((handler, handle))
    }

    /// Lets the `TestInput` thread finish once the queue is empty.
    pub fn close(&self, caller: &VirtualThread) -> Result<(), MonitorError> {
        let queue = &self.queue;
        queue.lock.lock(caller);
        queue.closed.store(true, Ordering::Release);
        queue.cond.signal_all(caller)?;
        queue.lock.unlock(caller)
    }

    fn reporter(&self) -> Option<Reporter> {
        self.reporter.lock().clone()
    }
}

fn drain(
    me: &VirtualThread,
    queue: &InputQueue,
    channels: &Channels,
    chip: &Chip,
) -> Result<(), MonitorError> {
    loop {
        queue.lock.lock(me);
        while queue.items.lock().is_empty() && !queue.closed.load(Ordering::Acquire) {
            if let Err(e) = queue.cond.wait(me) {
                queue.lock.unlock(me)?;
                return Err(e);
            }
        }
        let next = queue.items.lock().pop_front();
        queue.lock.unlock(me)?;

        let Some(channel) = next else {
            return Ok(());
        };
        if channel == channels.start.load(Ordering::Acquire) {
            info!("Start@");
            chip.start(me)?;
        } else {
            warn!(channel, "Unknown input");
        }
    }
}

impl Adapter for IoHandler {
    fn configure(&self, reporter: &Reporter) -> Result<(), ReporterError> {
        let start = reporter.add_input("start")?;
        let stop = reporter.add_output("stop")?;
        reporter.set_time_unit(TIME_UNIT)?;
        reporter.set_timeout(TIMEOUT_UNITS)?;
        self.channels.start.store(start, Ordering::Release);
        self.channels.stop.store(stop, Ordering::Release);
        *self.reporter.lock() = Some(reporter.clone());
        debug!(start, stop, "Chip interface configured");
        Ok(())
    }

    fn perform(&self, thread: &VirtualThread, channel: ChannelId, _params: &[i32]) {
        let queue = &self.queue;
        queue.lock.lock(thread);
        queue.items.lock().push_back(channel);
        if let Err(e) = queue.cond.signal_all(thread) {
            warn!("Cannot wake input handler: {e}");
        }
        if let Err(e) = queue.lock.unlock(thread) {
            warn!("Cannot release input queue: {e}");
        }
    }
}

impl ChipListener for IoHandler {
    fn report_stop(&self) {
        if let Some(reporter) = self.reporter() {
            info!("Stop!!");
            reporter.report(self.channels.stop.load(Ordering::Acquire));
        }
    }

    fn disconnect(&self) {
        if let Some(reporter) = self.reporter() {
            info!("(disconnect)");
            reporter.disconnect();
        }
    }
}
