//! Loopback peers for reporter tests: a scripted tester, a permissive clock
//! coordinator and an adapter that records what it is given.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tronadapt_config::ClockConfig;
use tronadapt_core::VirtualThread;
use tronadapt_protocols::socket_adapter::opcode;
use tronadapt_protocols::wire::{read_i16, read_i32, read_name, read_u32, read_u8};
use tronadapt_protocols::ChannelId;
use tronadapt_reporter::{Adapter, Reporter, ReporterError};

pub const PATIENCE: Duration = Duration::from_secs(5);

/// Polls `done` until it holds.
pub fn eventually(done: impl Fn() -> bool) {
    let started = Instant::now();
    while !done() {
        assert!(started.elapsed() < PATIENCE, "condition never became true");
        thread::sleep(Duration::from_millis(5));
    }
}

/// A configuration request as decoded by the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    InputEncoding(String),
    OutputEncoding(String),
    VarToInput(i32, String),
    VarToOutput(i32, String),
    TimeUnit(i32, i32),
    Timeout(i32),
    TestExec,
    GetError(i32),
}

/// Tester end of one connection.
pub struct TesterPeer {
    stream: TcpStream,
}

impl TesterPeer {
    pub fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().unwrap();
        Self::wrap(stream)
    }

    pub fn wrap(stream: TcpStream) -> Self {
        stream.set_read_timeout(Some(PATIENCE)).unwrap();
        Self { stream }
    }

    pub fn request(&mut self) -> Seen {
        let s = &mut self.stream;
        match read_u8(s).unwrap() {
            opcode::INPUT_ENCODING => Seen::InputEncoding(read_name(s).unwrap()),
            opcode::OUTPUT_ENCODING => Seen::OutputEncoding(read_name(s).unwrap()),
            opcode::VAR_TO_INPUT => Seen::VarToInput(read_i32(s).unwrap(), read_name(s).unwrap()),
            opcode::VAR_TO_OUTPUT => {
                Seen::VarToOutput(read_i32(s).unwrap(), read_name(s).unwrap())
            }
            opcode::TIME_UNIT => Seen::TimeUnit(read_i32(s).unwrap(), read_i32(s).unwrap()),
            opcode::TIMEOUT => Seen::Timeout(read_i32(s).unwrap()),
            opcode::TEST_EXEC => Seen::TestExec,
            opcode::GET_ERROR => Seen::GetError(read_i32(s).unwrap()),
            other => panic!("unexpected configuration opcode {other}"),
        }
    }

    pub fn reply(&mut self, code: i32) {
        self.stream.write_all(&code.to_be_bytes()).unwrap();
    }

    pub fn reply_text(&mut self, text: &str) {
        self.stream.write_all(&[text.len() as u8]).unwrap();
        self.stream.write_all(text.as_bytes()).unwrap();
    }

    /// Answers the usual handshake of [`RecordingAdapter::chip`].
    pub fn accept_chip_configuration(&mut self) {
        assert_eq!(self.request(), Seen::InputEncoding("start".into()));
        self.reply(1);
        assert_eq!(self.request(), Seen::OutputEncoding("stop".into()));
        self.reply(1);
        assert_eq!(self.request(), Seen::TimeUnit(0, 200));
        self.reply(0);
        assert_eq!(self.request(), Seen::Timeout(100_000));
        self.reply(0);
        assert_eq!(self.request(), Seen::TestExec);
        self.reply_text("");
    }

    pub fn send_input(&mut self, channel: ChannelId, params: &[i32]) {
        let mut frame = Vec::new();
        frame.extend_from_slice(&channel.to_be_bytes());
        frame.extend_from_slice(&(params.len() as i16).to_be_bytes());
        for p in params {
            frame.extend_from_slice(&p.to_be_bytes());
        }
        self.stream.write_all(&frame).unwrap();
    }

    pub fn send_ack(&mut self, count: u32) {
        self.stream
            .write_all(&(tronadapt_protocols::ACK_BIT | count).to_be_bytes())
            .unwrap();
    }

    pub fn read_u32(&mut self) -> u32 {
        read_u32(&mut self.stream).unwrap()
    }

    pub fn read_action(&mut self) -> (ChannelId, Vec<i32>) {
        let channel = read_i32(&mut self.stream).unwrap();
        let count = read_i16(&mut self.stream).unwrap();
        let params = (0..count)
            .map(|_| read_i32(&mut self.stream).unwrap())
            .collect();
        (channel, params)
    }

    /// Asserts that nothing arrives for a short while.
    pub fn expect_silence(&mut self) {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(150)))
            .unwrap();
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            other => panic!("expected silence, got {other:?}"),
        }
        self.stream.set_read_timeout(Some(PATIENCE)).unwrap();
    }

    /// Asserts that the reporter closed the connection.
    pub fn expect_closed(&mut self) {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) => {}
            Err(e) if e.kind() != ErrorKind::WouldBlock && e.kind() != ErrorKind::TimedOut => {}
            other => panic!("expected a closed connection, got {other:?}"),
        }
    }
}

/// Clock coordinator that grants everything immediately.
pub struct PermissiveClock {
    port: u16,
}

impl PermissiveClock {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                thread::spawn(move || serve_clock(stream));
            }
        });
        Self { port }
    }

    pub fn config(&self) -> ClockConfig {
        ClockConfig {
            connect_attempts: 1,
            retry_delay_ms: 1,
            ..ClockConfig::remote("127.0.0.1", self.port)
        }
    }
}

fn serve_clock(mut stream: TcpStream) {
    use tronadapt_protocols::clock::opcode as clock;

    if read_name(&mut stream).is_err() {
        return;
    }
    while let Ok(op) = read_u8(&mut stream) {
        let arity = match op {
            clock::MUTEX_DESTROY
            | clock::MUTEX_LOCK
            | clock::MUTEX_UNLOCK
            | clock::COND_DESTROY
            | clock::BROADCAST => 1,
            clock::WAIT => 2,
            clock::TIMED_WAIT | clock::DELAY => 4,
            _ => 0,
        };
        for _ in 0..arity {
            if read_i32(&mut stream).is_err() {
                return;
            }
        }
        let reply: &[i32] = match op {
            clock::QUIT => return,
            clock::MUTEX_DESTROY | clock::COND_DESTROY | clock::BROADCAST => &[],
            clock::GET_TIME => &[0, 0],
            _ => &[0],
        };
        for value in reply {
            if stream.write_all(&value.to_be_bytes()).is_err() {
                return;
            }
        }
    }
}

type Setup = dyn Fn(&Reporter) -> Result<Vec<ChannelId>, ReporterError> + Send + Sync;

/// Adapter that configures through `setup` and records what happens.
pub struct RecordingAdapter {
    setup: Box<Setup>,
    configured_tx: Sender<Result<Vec<ChannelId>, String>>,
    pub configured: Receiver<Result<Vec<ChannelId>, String>>,
    inputs_tx: Sender<(String, ChannelId, Vec<i32>)>,
    /// Thread name, channel and parameters of every delivered input.
    pub inputs: Receiver<(String, ChannelId, Vec<i32>)>,
    pub reporter: Mutex<Option<Reporter>>,
}

impl RecordingAdapter {
    pub fn new(
        setup: impl Fn(&Reporter) -> Result<Vec<ChannelId>, ReporterError> + Send + Sync + 'static,
    ) -> Self {
        let (configured_tx, configured) = unbounded();
        let (inputs_tx, inputs) = unbounded();
        Self {
            setup: Box::new(setup),
            configured_tx,
            configured,
            inputs_tx,
            inputs,
            reporter: Mutex::new(None),
        }
    }

    /// One input `start`, one output `stop`, 200 µs per time unit and a
    /// timeout of 100000 units.
    pub fn chip() -> Self {
        Self::new(|reporter| {
            let start = reporter.add_input("start")?;
            let stop = reporter.add_output("stop")?;
            reporter.set_time_unit(Duration::from_micros(200))?;
            reporter.set_timeout(100_000)?;
            Ok(vec![start, stop])
        })
    }

    /// Reporter handed to the last `configure`.
    pub fn reporter(&self) -> Reporter {
        self.reporter.lock().clone().unwrap()
    }

    pub fn next_configuration(&self) -> Result<Vec<ChannelId>, String> {
        self.configured.recv_timeout(PATIENCE).unwrap()
    }

    pub fn next_input(&self) -> (String, ChannelId, Vec<i32>) {
        self.inputs.recv_timeout(PATIENCE).unwrap()
    }
}

impl Adapter for RecordingAdapter {
    fn configure(&self, reporter: &Reporter) -> Result<(), ReporterError> {
        *self.reporter.lock() = Some(reporter.clone());
        match (self.setup)(reporter) {
            Ok(ids) => {
                let _ = self.configured_tx.send(Ok(ids));
                Ok(())
            }
            Err(e) => {
                let _ = self.configured_tx.send(Err(e.to_string()));
                Err(e)
            }
        }
    }

    fn perform(&self, thread: &VirtualThread, channel: ChannelId, params: &[i32]) {
        let _ = self
            .inputs_tx
            .send((thread.name().to_string(), channel, params.to_vec()));
    }
}
