use std::io;

use thiserror::Error;
use tronadapt_protocols::CodecError;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("testing already in progress")]
    AlreadyActive,

    #[error("tester is not connected")]
    NotConnected,

    #[error("{op}: {message} (code {code})")]
    Rejected {
        op: &'static str,
        code: i32,
        message: String,
    },

    #[error("tester configure problem: {0}")]
    ConfigurationRefused(String),

    #[error("adapter configuration failed: {0}")]
    Adapter(String),

    /// The tester answered a configuration request with a value the
    /// protocol does not allow.
    #[error("tester protocol violation: {0}")]
    Protocol(String),

    #[error("cannot resolve tester {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot listen for testers on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("tester protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("tester I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ReporterError {
    /// Whether the reporter cannot go on serving testers at all: the tester
    /// endpoint is unusable or the tester broke the configuration protocol.
    ///
    /// Everything else ends only the current connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReporterError::Resolve { .. }
                | ReporterError::Bind { .. }
                | ReporterError::Protocol(_)
        )
    }
}
