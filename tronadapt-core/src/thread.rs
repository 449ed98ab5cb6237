//! ## tronadapt-core::thread
//! **Thread handle tethered to the clock coordinator**
//!
//! A [`VirtualThread`] is created by [`VirtualRuntime`](crate::VirtualRuntime)
//! and identifies the calling thread to locks and conditions. In virtual
//! time it owns that thread's coordinator connection; in real time it only
//! carries an identity.
//!
//! Coordinator failures on this layer are process-fatal: virtual time
//! cannot be trusted once a thread has fallen out of step with it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::debug;

use crate::client::ClockClient;
use crate::error::{ClockError, MonitorError};
use crate::runtime::fatal;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a thread participating in the virtual time framework.
///
/// Clones refer to the same thread. Equality is identity.
#[derive(Clone)]
pub struct VirtualThread {
    inner: Arc<ThreadInner>,
}

struct ThreadInner {
    id: u64,
    name: String,
    clock: Option<Mutex<ClockClient>>,
    active: AtomicBool,
    locks_created: AtomicU32,
    conditions_created: AtomicU32,
}

impl VirtualThread {
    pub(crate) fn new(name: String, clock: Option<ClockClient>) -> Self {
        Self {
            inner: Arc::new(ThreadInner {
                id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
                name,
                clock: clock.map(Mutex::new),
                active: AtomicBool::new(true),
                locks_created: AtomicU32::new(0),
                conditions_created: AtomicU32::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True when this thread is connected to a clock coordinator.
    pub fn is_virtual(&self) -> bool {
        self.inner.clock.is_some()
    }

    /// False while deactivated from virtual time accounting.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Number of locks this thread has created.
    pub fn locks_created(&self) -> u32 {
        self.inner.locks_created.load(Ordering::Relaxed)
    }

    /// Number of conditions this thread has created.
    pub fn conditions_created(&self) -> u32 {
        self.inner.conditions_created.load(Ordering::Relaxed)
    }

    /// Removes this thread from virtual time accounting.
    ///
    /// A deactivated thread does not hold back the passage of virtual time
    /// but may still lock and signal. Meant for threads that talk to the
    /// outside world, such as the tester connection. No-op in real time.
    pub fn deactivate(&self) {
        if self.is_virtual() {
            self.must("deactivate", |clock| clock.deactivate());
        }
        self.inner.active.store(false, Ordering::Release);
    }

    /// Returns this thread to virtual time accounting.
    pub fn activate(&self) {
        if self.is_virtual() {
            self.must("activate", |clock| clock.activate());
        }
        self.inner.active.store(true, Ordering::Release);
    }

    /// Current time since the clock epoch: coordinator time in virtual mode,
    /// the UNIX epoch otherwise.
    pub fn now(&self) -> Duration {
        if self.is_virtual() {
            self.must("get_time", |clock| clock.get_time())
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
        }
    }

    pub(crate) fn quit(&self) {
        if self.is_virtual() {
            debug!(thread = %self.name(), "Leaving virtual time");
            self.must("quit", |clock| clock.quit());
        }
    }

    /// Coordinator-side mutex id, `None` in real time.
    pub(crate) fn mutex_init(&self) -> Option<i32> {
        self.inner.locks_created.fetch_add(1, Ordering::Relaxed);
        if self.is_virtual() {
            Some(self.must("mutex_init", |clock| clock.mutex_init()))
        } else {
            None
        }
    }

    pub(crate) fn mutex_destroy(&self, mutex: i32) {
        self.must("mutex_destroy", |clock| clock.mutex_destroy(mutex));
    }

    pub(crate) fn mutex_lock(&self, mutex: i32, lock_name: &str) {
        debug!(thread = %self.name(), lock = lock_name, "Locking");
        self.must("lock", |clock| clock.mutex_lock(mutex));
        debug!(thread = %self.name(), lock = lock_name, "Locked");
    }

    pub(crate) fn mutex_unlock(&self, mutex: i32, lock_name: &str) {
        self.must("unlock", |clock| clock.mutex_unlock(mutex));
        debug!(thread = %self.name(), lock = lock_name, "Unlocked");
    }

    /// Coordinator-side condition id, `None` in real time.
    pub(crate) fn cond_init(&self) -> Option<i32> {
        self.inner.conditions_created.fetch_add(1, Ordering::Relaxed);
        if self.is_virtual() {
            Some(self.must("cond_init", |clock| clock.cond_init()))
        } else {
            None
        }
    }

    pub(crate) fn cond_destroy(&self, cond: i32) {
        self.must("cond_destroy", |clock| clock.cond_destroy(cond));
    }

    pub(crate) fn cond_wait(&self, cond: i32, mutex: i32, name: &str) -> Result<(), MonitorError> {
        debug!(thread = %self.name(), condition = name, "Waiting");
        let outcome = self.clock("wait", |clock| clock.cond_wait(cond, mutex));
        debug!(thread = %self.name(), condition = name, "Woken");
        outcome.map_err(|e| interrupted(name, e))
    }

    pub(crate) fn cond_timed_wait(
        &self,
        cond: i32,
        mutex: i32,
        deadline: Duration,
        name: &str,
    ) -> Result<bool, MonitorError> {
        debug!(thread = %self.name(), condition = name, ?deadline, "Waiting until");
        self.clock("timed_wait", |clock| clock.cond_timed_wait(cond, mutex, deadline))
            .map_err(|e| interrupted(name, e))
    }

    pub(crate) fn cond_delay(
        &self,
        cond: i32,
        mutex: i32,
        delay: Duration,
        name: &str,
    ) -> Result<bool, MonitorError> {
        debug!(thread = %self.name(), condition = name, ?delay, "Waiting for");
        self.clock("delay", |clock| clock.cond_delay(cond, mutex, delay))
            .map_err(|e| interrupted(name, e))
    }

    pub(crate) fn cond_broadcast(&self, cond: i32, name: &str) {
        debug!(thread = %self.name(), condition = name, "Broadcasting");
        self.must("broadcast", |clock| clock.cond_broadcast(cond));
    }

    /// Runs a clock operation, terminating the process on fatal errors.
    fn clock<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut ClockClient) -> Result<T, ClockError>,
    ) -> Result<T, ClockError> {
        let Some(clock) = &self.inner.clock else {
            fatal(
                &format!("{}: {op}", self.name()),
                &ClockError::Unsupported("remote primitive on a thread without clock connection"),
            );
        };
        let mut client = clock.lock();
        match f(&mut client) {
            Err(e) if e.is_fatal() => fatal(&format!("{} failed to {op}", self.name()), &e),
            other => other,
        }
    }

    /// Runs a clock operation that has no recoverable failure mode.
    fn must<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut ClockClient) -> Result<T, ClockError>,
    ) -> T {
        match self.clock(op, f) {
            Ok(value) => value,
            Err(e) => fatal(&format!("{} failed to {op}", self.name()), &e),
        }
    }
}

fn interrupted(condition: &str, err: ClockError) -> MonitorError {
    let code = match err {
        ClockError::Interrupted { code } => code,
        _ => -1,
    };
    MonitorError::Interrupted {
        condition: condition.to_string(),
        code,
    }
}

impl PartialEq for VirtualThread {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for VirtualThread {}

impl fmt::Debug for VirtualThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualThread")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("virtual", &self.is_virtual())
            .finish()
    }
}
