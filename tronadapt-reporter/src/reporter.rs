//! ## tronadapt-reporter::reporter
//! **One tester connection at a time, configured then driven in steady state**
//!
//! Connection lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Configuring -> Active -> Disconnected
//!            ^                                       |
//!            +---------------------------------------+  (until shutdown)
//! ```
//!
//! The output socket and the acknowledgement credits share one lock, so
//! concurrent reports never interleave their frames. In virtual time a
//! report returns only after the tester acknowledged it, which keeps the
//! tester's view of virtual time in step with the adapter's.

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use tronadapt_config::TesterConfig;
use tronadapt_core::{VirtualRuntime, VirtualThread};
use tronadapt_protocols::socket_adapter::{encode_action, encode_ack};
use tronadapt_protocols::wire::{read_i32, read_name};
use tronadapt_protocols::{ChannelId, ConfigRequest, InboundFrame};

use crate::adapter::Adapter;
use crate::endpoint::Endpoint;
use crate::error::ReporterError;

/// Name of the thread serving the tester connection.
pub const RECEIVER_THREAD: &str = "TR.Receiver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Accepting or dialing a tester.
    Connecting,
    /// Connected; the adapter is registering its interface.
    Configuring,
    /// Exchanging actions.
    Active,
    Disconnected,
}

/// Handle to the tester connection. Clones share the connection.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Shared>,
}

struct Shared {
    virtual_time: bool,
    state: Mutex<ConnectionState>,
    abort: AtomicBool,
    output: Mutex<Output>,
    credit: Condvar,
    // Pairs each configuration request with its reply.
    exchange: Mutex<()>,
    wake_addr: Option<SocketAddr>,
}

struct Output {
    stream: Option<TcpStream>,
    buf: BytesMut,
    acks: u32,
    /// Bumped per connection so a stale report never consumes new credits.
    session: u64,
}

impl Reporter {
    fn new(virtual_time: bool, wake_addr: Option<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(Shared {
                virtual_time,
                state: Mutex::new(ConnectionState::Idle),
                abort: AtomicBool::new(false),
                output: Mutex::new(Output {
                    stream: None,
                    buf: BytesMut::with_capacity(64),
                    acks: 0,
                    session: 0,
                }),
                credit: Condvar::new(),
                exchange: Mutex::new(()),
                wake_addr,
            }),
        }
    }

    /// Starts serving testers on a new [`RECEIVER_THREAD`] of `runtime`.
    ///
    /// In listening mode the port is bound before this returns. The thread
    /// ends after [`shutdown`](Self::shutdown) or on a fatal error, which it
    /// returns.
    pub fn spawn<A: Adapter>(
        runtime: &VirtualRuntime,
        config: &TesterConfig,
        adapter: Arc<A>,
    ) -> Result<(Reporter, JoinHandle<Result<(), ReporterError>>), ReporterError> {
        let endpoint = Endpoint::open(config)?;
        let reporter = Reporter::new(runtime.is_virtual(), endpoint.wake_addr());
        let handle = runtime.spawn(RECEIVER_THREAD, {
            let reporter = reporter.clone();
            move |thread: &VirtualThread| reporter.run(thread, &endpoint, adapter.as_ref())
        })?;
        Ok((reporter, handle))
    }

    /// Address testers can connect to in listening mode.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.inner.wake_addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// True while actions are being exchanged.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    pub fn is_virtual(&self) -> bool {
        self.inner.virtual_time
    }

    /// Registers an input channel and returns its tester-assigned id.
    pub fn add_input(&self, channel: &str) -> Result<ChannelId, ReporterError> {
        self.register("add_input", ConfigRequest::InputEncoding { channel })
    }

    /// Registers an output channel and returns its tester-assigned id.
    pub fn add_output(&self, channel: &str) -> Result<ChannelId, ReporterError> {
        self.register("add_output", ConfigRequest::OutputEncoding { channel })
    }

    /// Appends `variable` to the parameters of input `channel`.
    pub fn add_var_to_input(&self, channel: ChannelId, variable: &str) -> Result<(), ReporterError> {
        self.configure("add_var_to_input", ConfigRequest::VarToInput { channel, variable })
            .map(drop)
    }

    /// Appends `variable` to the parameters of output `channel`.
    pub fn add_var_to_output(
        &self,
        channel: ChannelId,
        variable: &str,
    ) -> Result<(), ReporterError> {
        self.configure("add_var_to_output", ConfigRequest::VarToOutput { channel, variable })
            .map(drop)
    }

    /// Sets the real duration of one model time unit.
    pub fn set_time_unit(&self, unit: Duration) -> Result<(), ReporterError> {
        self.configure("set_time_unit", ConfigRequest::TimeUnit(unit))
            .map(drop)
    }

    /// Sets how many model time units testing may last.
    pub fn set_timeout(&self, units: i32) -> Result<(), ReporterError> {
        self.configure("set_timeout", ConfigRequest::Timeout(units))
            .map(drop)
    }

    /// Asks the tester to explain one of its negative reply codes.
    pub fn error_message(&self, code: i32) -> Result<String, ReporterError> {
        self.ensure_configuring()?;
        self.request_text(ConfigRequest::GetError(code))
    }

    /// Reports an output action without parameters.
    pub fn report(&self, channel: ChannelId) {
        self.report_with(channel, &[]);
    }

    /// Reports an output action.
    ///
    /// Outside of testing this does nothing. In virtual time the call blocks
    /// until the tester acknowledges the action or the connection drops.
    /// Write failures drop the connection and are otherwise swallowed.
    pub fn report_with(&self, channel: ChannelId, params: &[i32]) {
        let mut out = self.inner.output.lock();
        if self.state() != ConnectionState::Active {
            debug!(channel, "Not testing, output dropped");
            return;
        }
        let session = out.session;
        let Output { stream, buf, .. } = &mut *out;
        let Some(stream) = stream.as_mut() else {
            return;
        };
        buf.clear();
        if let Err(e) = encode_action(channel, params, buf) {
            warn!(channel, "Cannot encode output: {e}");
            return;
        }
        debug!(channel, ?params, "Reporting");
        if let Err(e) = stream.write_all(&buf[..]).and_then(|()| stream.flush()) {
            warn!(channel, "Report failed: {e}");
            drop(out);
            self.disconnect();
            return;
        }

        if self.inner.virtual_time {
            debug!(channel, "Waiting for ack");
            while out.acks == 0 && out.session == session && out.stream.is_some() {
                self.inner.credit.wait(&mut out);
            }
            if out.acks == 0 || out.session != session {
                debug!(channel, "Connection lost before ack");
                return;
            }
            out.acks -= 1;
        }
        debug!(channel, "Reported");
    }

    /// Drops the current tester connection. Blocked reports return.
    pub fn disconnect(&self) {
        let mut out = self.inner.output.lock();
        if let Some(stream) = out.stream.take() {
            debug!("Disconnecting tester");
            // The receiving half is a clone of this socket and wakes up too.
            let _ = stream.shutdown(Shutdown::Both);
        }
        out.acks = 0;
        self.inner.credit.notify_all();
        drop(out);

        let mut state = self.inner.state.lock();
        if *state != ConnectionState::Idle {
            *state = ConnectionState::Disconnected;
        }
    }

    /// Stops serving testers. The reporter thread exits once the current
    /// connection is torn down.
    pub fn shutdown(&self) {
        info!("Reporter shutting down");
        self.inner.abort.store(true, Ordering::Release);
        self.disconnect();
        if let Some(addr) = self.inner.wake_addr {
            // Unblocks a pending accept.
            let _ = TcpStream::connect(addr);
        }
    }

    fn is_aborted(&self) -> bool {
        self.inner.abort.load(Ordering::Acquire)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.inner.state.lock();
        debug!(from = ?*state, to = ?next, "Connection state");
        *state = next;
    }

    fn ensure_configuring(&self) -> Result<(), ReporterError> {
        match self.state() {
            ConnectionState::Configuring => Ok(()),
            ConnectionState::Active => Err(ReporterError::AlreadyActive),
            _ => Err(ReporterError::NotConnected),
        }
    }

    /// Sends a configuration request answered by an `i32`. Negative answers
    /// are explained by the tester and returned as [`ReporterError::Rejected`].
    fn configure(&self, op: &'static str, request: ConfigRequest<'_>) -> Result<i32, ReporterError> {
        self.ensure_configuring()?;
        let code = {
            let _pair = self.inner.exchange.lock();
            read_i32(&mut self.send(&request)?)?
        };
        debug!(op, code, "Configured");
        if code < 0 {
            let message = self.request_text(ConfigRequest::GetError(code))?;
            return Err(ReporterError::Rejected { op, code, message });
        }
        Ok(code)
    }

    /// Like [`configure`](Self::configure) for requests answered with a
    /// channel id, which the tester numbers from 1.
    fn register(
        &self,
        op: &'static str,
        request: ConfigRequest<'_>,
    ) -> Result<ChannelId, ReporterError> {
        match self.configure(op, request)? {
            0 => Err(ReporterError::Protocol(format!("{op}: tester assigned channel id 0"))),
            id => Ok(id),
        }
    }

    fn request_text(&self, request: ConfigRequest<'_>) -> Result<String, ReporterError> {
        debug_assert!(request.expects_text());
        let _pair = self.inner.exchange.lock();
        Ok(read_name(&mut self.send(&request)?)?)
    }

    /// Writes `request` and returns a handle to read the answer from. The
    /// output lock is not held while the answer is awaited, so a concurrent
    /// [`disconnect`](Self::disconnect) can still interrupt the read.
    fn send(&self, request: &ConfigRequest<'_>) -> Result<TcpStream, ReporterError> {
        let mut out = self.inner.output.lock();
        let Output { stream, buf, .. } = &mut *out;
        let stream = stream.as_mut().ok_or(ReporterError::NotConnected)?;
        buf.clear();
        request.encode(buf)?;
        stream.write_all(&buf[..])?;
        stream.flush()?;
        Ok(stream.try_clone()?)
    }

    fn run(
        &self,
        thread: &VirtualThread,
        endpoint: &Endpoint,
        adapter: &dyn Adapter,
    ) -> Result<(), ReporterError> {
        // Waiting on the tester must not hold back virtual time.
        thread.deactivate();
        let outcome = self.serve(thread, endpoint, adapter);
        thread.activate();
        outcome
    }

    fn serve(
        &self,
        thread: &VirtualThread,
        endpoint: &Endpoint,
        adapter: &dyn Adapter,
    ) -> Result<(), ReporterError> {
        while !self.is_aborted() {
            let outcome = self.session(thread, endpoint, adapter);
            self.disconnect();
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if self.is_aborted() => debug!("Session closed: {e}"),
                Err(e) => {
                    warn!("Tester session ended: {e}");
                    endpoint.backoff();
                }
            }
        }
        info!("Reporter stopped");
        Ok(())
    }

    fn session(
        &self,
        thread: &VirtualThread,
        endpoint: &Endpoint,
        adapter: &dyn Adapter,
    ) -> Result<(), ReporterError> {
        self.set_state(ConnectionState::Connecting);
        let Some(stream) = endpoint.connect(&self.inner.abort)? else {
            return Ok(());
        };
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        {
            let mut out = self.inner.output.lock();
            out.stream = Some(stream);
            out.acks = 0;
            out.session += 1;
        }
        if self.is_aborted() {
            return Ok(());
        }

        self.set_state(ConnectionState::Configuring);
        adapter.configure(self)?;
        let verdict = self.request_text(ConfigRequest::TestExec)?;
        if !verdict.is_empty() {
            return Err(ReporterError::ConfigurationRefused(verdict));
        }
        self.set_state(ConnectionState::Active);
        info!("Testing started");

        self.receive(thread, reader, adapter)
    }

    fn receive(
        &self,
        thread: &VirtualThread,
        mut reader: TcpStream,
        adapter: &dyn Adapter,
    ) -> Result<(), ReporterError> {
        while !self.is_aborted() {
            debug!("Waiting for inputs");
            match InboundFrame::read_from(&mut reader)? {
                InboundFrame::Ack(count) => {
                    debug!(count, "Got ack");
                    if self.inner.virtual_time {
                        let mut out = self.inner.output.lock();
                        out.acks = out.acks.saturating_add(count);
                        self.inner.credit.notify_all();
                    }
                }
                InboundFrame::Input { channel, params } => {
                    debug!(channel, ?params, "Perform");
                    adapter.perform(thread, channel, &params);
                    if self.inner.virtual_time {
                        self.acknowledge()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Tells the tester one input has been received.
    fn acknowledge(&self) -> Result<(), ReporterError> {
        let mut out = self.inner.output.lock();
        let Output { stream, buf, .. } = &mut *out;
        let stream = stream.as_mut().ok_or(ReporterError::NotConnected)?;
        buf.clear();
        encode_ack(1, buf);
        stream.write_all(&buf[..])?;
        stream.flush()?;
        Ok(())
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("state", &self.state())
            .field("virtual", &self.inner.virtual_time)
            .finish()
    }
}
