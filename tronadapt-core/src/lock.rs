//! ## tronadapt-core::lock
//! **Mutual exclusion that works in real and virtual time**
//!
//! A lock is backed either by a local reentrant monitor or by a mutex held
//! at the clock coordinator. The backing is chosen once, from the creating
//! thread's mode, and every thread of one runtime shares that mode.
//!
//! The recorded owner is published only after an acquisition is confirmed
//! and withdrawn before a release is issued.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::condition::VirtualCondition;
use crate::error::MonitorError;
use crate::thread::VirtualThread;

/// Identifier reported by locks and conditions that live in this process.
pub const LOCAL_ID: i32 = -1;

/// A lock usable from [`VirtualThread`]s.
///
/// Clones refer to the same lock.
#[derive(Clone)]
pub struct VirtualLock {
    inner: Arc<LockInner>,
}

struct LockInner {
    id: i32,
    name: String,
    owner: Mutex<Option<VirtualThread>>,
    backend: Backend,
}

enum Backend {
    Local(LocalMonitor),
    Remote,
}

/// Reentrant monitor used in real time.
pub(crate) struct LocalMonitor {
    pub(crate) state: Mutex<LocalState>,
    pub(crate) available: Condvar,
}

pub(crate) struct LocalState {
    pub(crate) holder: Option<u64>,
    pub(crate) holds: u32,
}

impl LocalMonitor {
    fn new() -> Self {
        Self {
            state: Mutex::new(LocalState {
                holder: None,
                holds: 0,
            }),
            available: Condvar::new(),
        }
    }
}

impl VirtualLock {
    /// Creates a lock named after `thread` with `-lock` appended.
    pub fn new(thread: &VirtualThread) -> Self {
        Self::named(thread, format!("{}-lock", thread.name()))
    }

    /// Creates a lock with a name that shows up in debug logs.
    pub fn named(thread: &VirtualThread, name: impl Into<String>) -> Self {
        let (id, backend) = match thread.mutex_init() {
            Some(id) => (id, Backend::Remote),
            None => (LOCAL_ID, Backend::Local(LocalMonitor::new())),
        };
        Self {
            inner: Arc::new(LockInner {
                id,
                name: name.into(),
                owner: Mutex::new(None),
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

    pub fn is_remote(&self) -> bool {
        matches!(self.inner.backend, Backend::Remote)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.owner.lock().is_some()
    }

    pub fn owner(&self) -> Option<VirtualThread> {
        self.inner.owner.lock().clone()
    }

    pub fn is_held_by(&self, thread: &VirtualThread) -> bool {
        self.inner.owner.lock().as_ref() == Some(thread)
    }

    /// Acquires the lock, blocking while another thread holds it.
    ///
    /// Local locks are reentrant. Reentrancy of remote locks is up to the
    /// coordinator.
    pub fn lock(&self, thread: &VirtualThread) {
        match &self.inner.backend {
            Backend::Local(monitor) => {
                let mut state = monitor.state.lock();
                if state.holder == Some(thread.id()) {
                    state.holds += 1;
                    return;
                }
                while state.holder.is_some() {
                    monitor.available.wait(&mut state);
                }
                state.holder = Some(thread.id());
                state.holds = 1;
                self.set_owner(Some(thread.clone()));
            }
            Backend::Remote => {
                thread.mutex_lock(self.inner.id, &self.inner.name);
                self.set_owner(Some(thread.clone()));
            }
        }
    }

    /// Releases the lock. Fails without side effects unless `thread` is the
    /// recorded owner.
    pub fn unlock(&self, thread: &VirtualThread) -> Result<(), MonitorError> {
        self.check_owner(thread, "unlock")?;
        match &self.inner.backend {
            Backend::Local(monitor) => {
                let mut state = monitor.state.lock();
                state.holds -= 1;
                if state.holds == 0 {
                    self.set_owner(None);
                    state.holder = None;
                    monitor.available.notify_one();
                }
            }
            Backend::Remote => {
                self.set_owner(None);
                thread.mutex_unlock(self.inner.id, &self.inner.name);
            }
        }
        Ok(())
    }

    /// Creates a condition bound to this lock, named after the lock.
    pub fn new_condition(&self, thread: &VirtualThread) -> VirtualCondition {
        self.new_named_condition(thread, format!("{}-cond", self.inner.name))
    }

    pub fn new_named_condition(
        &self,
        thread: &VirtualThread,
        name: impl Into<String>,
    ) -> VirtualCondition {
        VirtualCondition::new(self.clone(), thread, name.into())
    }

    /// Releases the coordinator-side mutex. Local locks need no teardown.
    pub fn destroy(self, thread: &VirtualThread) {
        if self.is_remote() {
            thread.mutex_destroy(self.inner.id);
        }
    }

    pub(crate) fn check_owner(
        &self,
        thread: &VirtualThread,
        operation: &'static str,
    ) -> Result<(), MonitorError> {
        if self.is_held_by(thread) {
            Ok(())
        } else {
            Err(MonitorError::NotOwner {
                operation,
                lock: self.inner.name.clone(),
                thread: thread.name().to_string(),
            })
        }
    }

    pub(crate) fn set_owner(&self, owner: Option<VirtualThread>) {
        *self.inner.owner.lock() = owner;
    }

    pub(crate) fn local_monitor(&self) -> Option<&LocalMonitor> {
        match &self.inner.backend {
            Backend::Local(monitor) => Some(monitor),
            Backend::Remote => None,
        }
    }
}

impl fmt::Debug for VirtualLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualLock")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("owner", &self.owner().map(|t| t.name().to_string()))
            .finish()
    }
}
