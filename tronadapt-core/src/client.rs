//! ## tronadapt-core::client
//! **Per-thread connection to the virtual clock coordinator**
//!
//! Every call is a synchronous round trip: the command is written and the
//! calling thread blocks on the reply. A connection belongs to exactly one
//! thread, so at most one request is ever outstanding on it.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use tronadapt_protocols::clock::encode_hello;
use tronadapt_protocols::wire::{read_duration, read_i32};
use tronadapt_protocols::{ClockCommand, Reply};

use crate::error::ClockError;

/// Longest wait the 32-bit seconds field can carry. Longer waits and later
/// deadlines are cut to it.
const LONGEST_WAIT: Duration = Duration::from_secs(i32::MAX as u64);

/// Blocking client for the clock protocol.
#[derive(Debug)]
pub struct ClockClient {
    name: String,
    stream: TcpStream,
    buf: BytesMut,
}

impl ClockClient {
    /// Connects to `endpoint` and announces `name`.
    ///
    /// Refused connections are retried up to `attempts` times with
    /// `retry_delay` in between. Resolution failures are not retried.
    pub fn connect(
        endpoint: &str,
        name: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, ClockError> {
        let addrs: Vec<SocketAddr> = endpoint
            .to_socket_addrs()
            .map_err(|source| ClockError::Resolve {
                endpoint: endpoint.to_string(),
                source,
            })?
            .collect();

        let attempts = attempts.max(1);
        let mut remaining = attempts;
        loop {
            remaining -= 1;
            debug!(thread = name, endpoint, remaining, "Connecting to clock");
            match TcpStream::connect(&addrs[..]) {
                Ok(stream) => return Self::handshake(stream, name),
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    warn!(thread = name, endpoint, "Clock refused connection: {e}");
                    if remaining == 0 {
                        return Err(ClockError::Unreachable {
                            endpoint: endpoint.to_string(),
                            attempts,
                        });
                    }
                    thread::sleep(retry_delay);
                }
                Err(e) => return Err(ClockError::Io(e)),
            }
        }
    }

    fn handshake(stream: TcpStream, name: &str) -> Result<Self, ClockError> {
        stream.set_nodelay(true)?;
        let mut client = Self {
            name: name.to_string(),
            stream,
            buf: BytesMut::with_capacity(32),
        };
        encode_hello(name, &mut client.buf)?;
        client.flush_buf()?;
        debug!(thread = name, "Connected to clock");
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn flush_buf(&mut self) -> Result<(), ClockError> {
        trace!(thread = %self.name, bytes = %hex::encode(&self.buf), "clock <-");
        self.stream.write_all(&self.buf)?;
        self.stream.flush()?;
        self.buf.clear();
        Ok(())
    }

    /// Sends a command without waiting for anything back.
    fn send(&mut self, cmd: ClockCommand) -> Result<(), ClockError> {
        self.buf.clear();
        cmd.encode(&mut self.buf)?;
        self.flush_buf()
    }

    /// Sends a command and blocks for its `i32` reply.
    fn call(&mut self, cmd: ClockCommand) -> Result<i32, ClockError> {
        debug_assert!(cmd.expects_reply());
        self.send(cmd)?;
        let reply = read_i32(&mut self.stream)?;
        trace!(thread = %self.name, reply, "clock ->");
        Ok(reply)
    }

    fn expect_ok(&mut self, op: &'static str, cmd: ClockCommand) -> Result<(), ClockError> {
        match self.call(cmd)? {
            0 => Ok(()),
            code => Err(ClockError::Rejected { op, code }),
        }
    }

    /// Stops this thread from holding back virtual time.
    pub fn deactivate(&mut self) -> Result<(), ClockError> {
        let reply = self.call(ClockCommand::Deactivate)?;
        debug!(thread = %self.name, reply, "Deactivated");
        Ok(())
    }

    /// Counts this thread towards virtual time again.
    pub fn activate(&mut self) -> Result<(), ClockError> {
        let reply = self.call(ClockCommand::Activate)?;
        debug!(thread = %self.name, reply, "Activated");
        Ok(())
    }

    pub fn quit(&mut self) -> Result<(), ClockError> {
        self.send(ClockCommand::Quit)
    }

    /// Allocates a coordinator-side mutex.
    pub fn mutex_init(&mut self) -> Result<i32, ClockError> {
        self.call(ClockCommand::MutexInit)
    }

    pub fn mutex_destroy(&mut self, mutex: i32) -> Result<(), ClockError> {
        self.send(ClockCommand::MutexDestroy { mutex })
    }

    /// Blocks until the coordinator grants the mutex.
    pub fn mutex_lock(&mut self, mutex: i32) -> Result<(), ClockError> {
        self.expect_ok("lock", ClockCommand::MutexLock { mutex })
    }

    pub fn mutex_unlock(&mut self, mutex: i32) -> Result<(), ClockError> {
        self.expect_ok("unlock", ClockCommand::MutexUnlock { mutex })
    }

    /// Allocates a coordinator-side condition.
    pub fn cond_init(&mut self) -> Result<i32, ClockError> {
        self.call(ClockCommand::CondInit)
    }

    pub fn cond_destroy(&mut self, cond: i32) -> Result<(), ClockError> {
        self.send(ClockCommand::CondDestroy { cond })
    }

    /// Waits until `cond` is signalled, releasing `mutex` meanwhile.
    pub fn cond_wait(&mut self, cond: i32, mutex: i32) -> Result<(), ClockError> {
        match Reply::from_code(self.call(ClockCommand::Wait { cond, mutex })?) {
            Reply::Ok => Ok(()),
            other => Err(ClockError::Interrupted { code: other.code() }),
        }
    }

    /// Waits until signalled or until the absolute virtual time `deadline`.
    /// Returns `false` on timeout.
    pub fn cond_timed_wait(
        &mut self,
        cond: i32,
        mutex: i32,
        deadline: Duration,
    ) -> Result<bool, ClockError> {
        let code = self.call(ClockCommand::TimedWait {
            cond,
            mutex,
            deadline: deadline.min(LONGEST_WAIT),
        })?;
        timed_outcome(code)
    }

    /// Waits until signalled or until `delay` of virtual time has passed.
    /// Returns `false` on timeout.
    pub fn cond_delay(
        &mut self,
        cond: i32,
        mutex: i32,
        delay: Duration,
    ) -> Result<bool, ClockError> {
        let code = self.call(ClockCommand::Delay {
            cond,
            mutex,
            delay: delay.min(LONGEST_WAIT),
        })?;
        timed_outcome(code)
    }

    /// Wakes every waiter of `cond`. The coordinator offers no single-waiter
    /// wake-up, so this also serves `VirtualCondition::signal`.
    pub fn cond_broadcast(&mut self, cond: i32) -> Result<(), ClockError> {
        self.send(ClockCommand::Broadcast { cond })
    }

    /// Current virtual time since the coordinator's epoch.
    pub fn get_time(&mut self) -> Result<Duration, ClockError> {
        self.send(ClockCommand::GetTime)?;
        Ok(read_duration(&mut self.stream)?)
    }
}

fn timed_outcome(code: i32) -> Result<bool, ClockError> {
    match Reply::from_code(code) {
        Reply::Ok => Ok(true),
        Reply::TimedOut => Ok(false),
        other => Err(ClockError::Interrupted { code: other.code() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tronadapt_protocols::clock::opcode;
    use tronadapt_protocols::wire::{read_name, read_u8};

    #[test]
    fn timed_reply_codes() {
        assert!(timed_outcome(0).unwrap());
        assert!(!timed_outcome(65).unwrap());
        assert!(matches!(
            timed_outcome(66),
            Err(ClockError::Interrupted { code: 66 })
        ));
        assert!(matches!(
            timed_outcome(7),
            Err(ClockError::Interrupted { code: 7 })
        ));
    }

    /// Accepts one client and answers its first mutex command with `code`.
    /// Yields the opcode and mutex id it was sent.
    fn mutex_peer(code: i32) -> (String, thread::JoinHandle<(u8, i32)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_name(&mut stream).unwrap();
            let op = read_u8(&mut stream).unwrap();
            let mutex = read_i32(&mut stream).unwrap();
            stream.write_all(&code.to_be_bytes()).unwrap();
            (op, mutex)
        });
        (endpoint, peer)
    }

    #[test]
    fn refused_lock_is_fatal() {
        let (endpoint, peer) = mutex_peer(7);
        let mut client = ClockClient::connect(&endpoint, "t", 1, Duration::ZERO).unwrap();
        let err = client.mutex_lock(4).unwrap_err();
        assert!(matches!(err, ClockError::Rejected { op: "lock", code: 7 }));
        assert!(err.is_fatal());
        assert_eq!(peer.join().unwrap(), (opcode::MUTEX_LOCK, 4));
    }

    #[test]
    fn refused_unlock_is_fatal() {
        let (endpoint, peer) = mutex_peer(64);
        let mut client = ClockClient::connect(&endpoint, "t", 1, Duration::ZERO).unwrap();
        let err = client.mutex_unlock(2).unwrap_err();
        assert!(matches!(err, ClockError::Rejected { op: "unlock", code: 64 }));
        assert!(err.is_fatal());
        assert_eq!(peer.join().unwrap(), (opcode::MUTEX_UNLOCK, 2));
    }

    #[test]
    fn refused_connection_is_bounded() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = format!("127.0.0.1:{port}");
        let err = ClockClient::connect(&endpoint, "t", 2, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, ClockError::Unreachable { attempts: 2, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn unresolvable_host_is_not_retried() {
        let err = ClockClient::connect("no-such-host.invalid:1", "t", 5, Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, ClockError::Resolve { .. }));
    }
}
