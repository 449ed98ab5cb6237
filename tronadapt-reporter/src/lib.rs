//! # tronadapt-reporter
//!
//! Tester side of the adapter runtime. A [`Reporter`] keeps at most one
//! connection to the online tester, lets an [`Adapter`] configure its
//! channels on every new connection, delivers input actions to it and
//! reports its output actions back.

pub mod adapter;
mod endpoint;
pub mod error;
pub mod reporter;

pub use adapter::Adapter;
pub use error::ReporterError;
pub use reporter::{ConnectionState, Reporter, RECEIVER_THREAD};
