//! ## tronadapt-core::condition
//! **Condition variables bound to a [`VirtualLock`]**
//!
//! Every operation checks that the caller owns the associated lock before it
//! touches the monitor or the network. While a waiter is suspended the lock
//! reports no owner; ownership is restored to the waiter when it resumes,
//! whether it was signalled, timed out or interrupted.
//!
//! In virtual time `signal` wakes every waiter, the same as `signal_all`.
//! The coordinator has no single-waiter wake-up.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Condvar;

use crate::error::MonitorError;
use crate::lock::{LocalMonitor, VirtualLock, LOCAL_ID};
use crate::thread::VirtualThread;

/// A condition variable usable from [`VirtualThread`]s.
///
/// Created through [`VirtualLock::new_condition`]. Clones refer to the same
/// condition.
#[derive(Clone)]
pub struct VirtualCondition {
    inner: Arc<CondInner>,
}

struct CondInner {
    id: i32,
    name: String,
    lock: VirtualLock,
    backend: CondBackend,
}

enum CondBackend {
    Local {
        // Bumped under the monitor's state lock on every signal.
        generation: AtomicU64,
        signal: Condvar,
    },
    Remote,
}

impl VirtualCondition {
    pub(crate) fn new(lock: VirtualLock, thread: &VirtualThread, name: String) -> Self {
        let (id, backend) = match thread.cond_init().filter(|_| lock.is_remote()) {
            Some(id) => (id, CondBackend::Remote),
            None => (
                LOCAL_ID,
                CondBackend::Local {
                    generation: AtomicU64::new(0),
                    signal: Condvar::new(),
                },
            ),
        };
        Self {
            inner: Arc::new(CondInner {
                id,
                name,
                lock,
                backend,
            }),
        }
    }

    /// Coordinator id, or [`LOCAL_ID`].
    pub fn id(&self) -> i32 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The lock this condition is bound to.
    pub fn lock(&self) -> &VirtualLock {
        &self.inner.lock
    }

    /// Waits until signalled.
    pub fn wait(&self, thread: &VirtualThread) -> Result<(), MonitorError> {
        self.inner.lock.check_owner(thread, "wait")?;
        match self.local() {
            Some((monitor, generation, signal)) => {
                self.wait_local(thread, monitor, generation, signal, None);
                Ok(())
            }
            None => self.suspended(thread, |lock| {
                thread.cond_wait(self.inner.id, lock.id(), &self.inner.name)
            }),
        }
    }

    /// Waits until signalled or until `timeout` has elapsed, measured in
    /// virtual time when the lock is remote. Returns `false` on timeout.
    pub fn wait_timeout(
        &self,
        thread: &VirtualThread,
        timeout: Duration,
    ) -> Result<bool, MonitorError> {
        self.inner.lock.check_owner(thread, "wait_timeout")?;
        match self.local() {
            Some((monitor, generation, signal)) => {
                // A timeout past the end of `Instant` waits without one.
                let deadline = Instant::now().checked_add(timeout);
                Ok(self.wait_local(thread, monitor, generation, signal, deadline))
            }
            None => self.suspended(thread, |lock| {
                thread.cond_delay(self.inner.id, lock.id(), timeout, &self.inner.name)
            }),
        }
    }

    /// Waits until signalled or until the clock reads `deadline`, as returned
    /// by [`VirtualThread::now`]. Returns `false` on timeout.
    pub fn wait_until(
        &self,
        thread: &VirtualThread,
        deadline: Duration,
    ) -> Result<bool, MonitorError> {
        self.inner.lock.check_owner(thread, "wait_until")?;
        match self.local() {
            Some((monitor, generation, signal)) => {
                let remaining = deadline.saturating_sub(thread.now());
                let deadline = Instant::now().checked_add(remaining);
                Ok(self.wait_local(thread, monitor, generation, signal, deadline))
            }
            None => self.suspended(thread, |lock| {
                thread.cond_timed_wait(self.inner.id, lock.id(), deadline, &self.inner.name)
            }),
        }
    }

    /// Wakes one waiter in real time and every waiter in virtual time.
    pub fn signal(&self, thread: &VirtualThread) -> Result<(), MonitorError> {
        self.inner.lock.check_owner(thread, "signal")?;
        self.notify(thread, false);
        Ok(())
    }

    /// Wakes every waiter.
    pub fn signal_all(&self, thread: &VirtualThread) -> Result<(), MonitorError> {
        self.inner.lock.check_owner(thread, "signal_all")?;
        self.notify(thread, true);
        Ok(())
    }

    /// Releases the coordinator-side condition. Local conditions need no
    /// teardown.
    pub fn destroy(self, thread: &VirtualThread) {
        if let CondBackend::Remote = self.inner.backend {
            thread.cond_destroy(self.inner.id);
        }
    }

    fn local(&self) -> Option<(&LocalMonitor, &AtomicU64, &Condvar)> {
        match &self.inner.backend {
            CondBackend::Local { generation, signal } => self
                .inner
                .lock
                .local_monitor()
                .map(|monitor| (monitor, generation, signal)),
            CondBackend::Remote => None,
        }
    }

    fn notify(&self, thread: &VirtualThread, all: bool) {
        match self.local() {
            Some((monitor, generation, signal)) => {
                let _state = monitor.state.lock();
                generation.fetch_add(1, Ordering::AcqRel);
                if all {
                    signal.notify_all();
                } else {
                    signal.notify_one();
                }
            }
            None => thread.cond_broadcast(self.inner.id, &self.inner.name),
        }
    }

    /// Runs a remote wait with the lock's owner withdrawn for its duration.
    fn suspended<T>(
        &self,
        thread: &VirtualThread,
        wait: impl FnOnce(&VirtualLock) -> Result<T, MonitorError>,
    ) -> Result<T, MonitorError> {
        let lock = &self.inner.lock;
        lock.set_owner(None);
        let outcome = wait(lock);
        lock.set_owner(Some(thread.clone()));
        outcome
    }

    /// Releases the local monitor, sleeps until a signal or `deadline`, then
    /// reacquires the monitor with its previous hold count. Returns whether a
    /// signal arrived.
    fn wait_local(
        &self,
        thread: &VirtualThread,
        monitor: &LocalMonitor,
        generation: &AtomicU64,
        signal: &Condvar,
        deadline: Option<Instant>,
    ) -> bool {
        let lock = &self.inner.lock;
        let mut state = monitor.state.lock();
        let holds = state.holds;
        lock.set_owner(None);
        state.holder = None;
        state.holds = 0;
        monitor.available.notify_one();

        let start = generation.load(Ordering::Acquire);
        let mut signalled = true;
        while generation.load(Ordering::Acquire) == start {
            match deadline {
                None => signal.wait(&mut state),
                Some(at) => {
                    if signal.wait_until(&mut state, at).timed_out() {
                        signalled = generation.load(Ordering::Acquire) != start;
                        break;
                    }
                }
            }
        }

        while state.holder.is_some() {
            monitor.available.wait(&mut state);
        }
        state.holder = Some(thread.id());
        state.holds = holds;
        lock.set_owner(Some(thread.clone()));
        signalled
    }
}

impl fmt::Debug for VirtualCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualCondition")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("lock", &self.inner.lock.name())
            .finish()
    }
}
