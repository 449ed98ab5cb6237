//! # tronadapt-core
//!
//! Virtual-time concurrency substrate for test adapters.
//!
//! Threads created through a [`VirtualRuntime`] obey either the host clock or
//! a remote clock coordinator. The monitor primitives built on them,
//! [`VirtualLock`] and [`VirtualCondition`], keep one programming interface
//! in both modes: in virtual time every lock, wait and signal is a
//! synchronous round trip to the coordinator, which serializes all
//! time-affecting events of the participating threads.
//!
//! ### Key Submodules:
//! - `client`: blocking clock protocol client, one per thread
//! - `runtime`: thread factory holding the coordinator configuration
//! - `lock` / `condition`: dual-mode monitor primitives

pub mod client;
pub mod condition;
pub mod error;
pub mod lock;
pub mod runtime;
pub mod thread;

pub mod prelude {
    pub use crate::condition::VirtualCondition;
    pub use crate::error::*;
    pub use crate::lock::VirtualLock;
    pub use crate::runtime::VirtualRuntime;
    pub use crate::thread::VirtualThread;
}

pub use client::ClockClient;
pub use condition::VirtualCondition;
pub use error::{ClockError, MonitorError};
pub use lock::{VirtualLock, LOCAL_ID};
pub use runtime::{fatal, VirtualRuntime};
pub use thread::VirtualThread;
