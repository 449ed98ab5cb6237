//! Where tester connections come from.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use tronadapt_config::{TesterConfig, TesterMode};

use crate::error::ReporterError;

pub(crate) enum Endpoint {
    Listen(TcpListener),
    Dial {
        endpoint: String,
        retry_delay: Duration,
    },
}

impl Endpoint {
    /// Binds the listening socket right away so that a busy port is reported
    /// before the reporter thread starts.
    pub(crate) fn open(config: &TesterConfig) -> Result<Self, ReporterError> {
        match config.mode {
            TesterMode::Listen => {
                let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).map_err(
                    |source| ReporterError::Bind {
                        port: config.port,
                        source,
                    },
                )?;
                info!("Listening for testers on {}", listener.local_addr()?);
                Ok(Endpoint::Listen(listener))
            }
            TesterMode::Dial => Ok(Endpoint::Dial {
                endpoint: format!("{}:{}", config.host, config.port),
                retry_delay: config.reconnect_delay(),
            }),
        }
    }

    /// Loopback address that reaches a pending `accept`.
    pub(crate) fn wake_addr(&self) -> Option<SocketAddr> {
        match self {
            Endpoint::Listen(listener) => {
                let mut addr = listener.local_addr().ok()?;
                if addr.ip().is_unspecified() {
                    let loopback: IpAddr = if addr.is_ipv4() {
                        Ipv4Addr::LOCALHOST.into()
                    } else {
                        Ipv6Addr::LOCALHOST.into()
                    };
                    addr.set_ip(loopback);
                }
                Some(addr)
            }
            Endpoint::Dial { .. } => None,
        }
    }

    /// Waits for the next tester connection. `None` once `abort` is raised.
    pub(crate) fn connect(&self, abort: &AtomicBool) -> Result<Option<TcpStream>, ReporterError> {
        match self {
            Endpoint::Listen(listener) => {
                let (stream, peer) = listener.accept()?;
                if abort.load(Ordering::Acquire) {
                    return Ok(None);
                }
                info!("Tester connected from {peer}");
                Ok(Some(stream))
            }
            Endpoint::Dial {
                endpoint,
                retry_delay,
            } => {
                let addrs: Vec<SocketAddr> = endpoint
                    .to_socket_addrs()
                    .map_err(|source| ReporterError::Resolve {
                        endpoint: endpoint.clone(),
                        source,
                    })?
                    .collect();
                loop {
                    if abort.load(Ordering::Acquire) {
                        return Ok(None);
                    }
                    debug!(endpoint = %endpoint, "Dialing tester");
                    match TcpStream::connect(&addrs[..]) {
                        Ok(stream) => {
                            info!("Connected to tester at {endpoint}");
                            return Ok(Some(stream));
                        }
                        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                            warn!("Tester at {endpoint} refused connection, retrying");
                            thread::sleep(*retry_delay);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Pause before the next attempt after a failed session.
    pub(crate) fn backoff(&self) {
        if let Endpoint::Dial { retry_delay, .. } = self {
            thread::sleep(*retry_delay);
        }
    }
}
