use std::io;

use thiserror::Error;
use tronadapt_protocols::CodecError;

/// Failures talking to the clock coordinator.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("cannot resolve clock coordinator {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("clock coordinator {endpoint} refused {attempts} connection attempts")]
    Unreachable { endpoint: String, attempts: u32 },

    #[error("clock {op} failed with reply code {code}")]
    Rejected { op: &'static str, code: i32 },

    #[error("clock wait interrupted with reply code {code}")]
    Interrupted { code: i32 },

    #[error("clock command {0} is not supported")]
    Unsupported(&'static str),

    #[error("clock codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("clock I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ClockError {
    /// Whether the error leaves virtual time in an unknown state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClockError::Interrupted { .. } | ClockError::Unsupported(_)
        )
    }
}

/// Monitor discipline violations and interrupted waits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("illegal monitor state: {thread} does not own {lock} ({operation})")]
    NotOwner {
        operation: &'static str,
        lock: String,
        thread: String,
    },

    #[error("wait on {condition} interrupted by clock reply {code}")]
    Interrupted { condition: String, code: i32 },
}
