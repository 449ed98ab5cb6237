//! Scripted clock coordinator on loopback TCP.

use std::collections::VecDeque;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tronadapt_config::ClockConfig;
use tronadapt_protocols::clock::opcode;
use tronadapt_protocols::wire::{read_i32, read_name, read_u8};

/// One command as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub thread: String,
    pub opcode: u8,
    pub args: Vec<i32>,
}

#[derive(Default)]
struct Shared {
    hellos: Mutex<Vec<String>>,
    requests: Mutex<Vec<Request>>,
    timed_replies: Mutex<VecDeque<i32>>,
    next_id: AtomicI32,
}

pub struct FakeClock {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeClock {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared {
            next_id: AtomicI32::new(1),
            ..Shared::default()
        });
        let accept_shared = shared.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let shared = accept_shared.clone();
                thread::spawn(move || serve(stream, shared));
            }
        });
        Self { port, shared }
    }

    pub fn config(&self) -> ClockConfig {
        ClockConfig {
            connect_attempts: 1,
            retry_delay_ms: 1,
            ..ClockConfig::remote("127.0.0.1", self.port)
        }
    }

    /// Queues reply codes for timed-wait and delay commands. Without a
    /// queued code those commands time out.
    pub fn script_timed(&self, codes: &[i32]) {
        self.shared.timed_replies.lock().extend(codes);
    }

    pub fn hellos(&self) -> Vec<String> {
        self.shared.hellos.lock().clone()
    }

    pub fn requests_from(&self, thread: &str) -> Vec<Request> {
        self.shared
            .requests
            .lock()
            .iter()
            .filter(|r| r.thread == thread)
            .cloned()
            .collect()
    }

    pub fn opcodes_from(&self, thread: &str) -> Vec<u8> {
        self.requests_from(thread).iter().map(|r| r.opcode).collect()
    }

    /// Polls until `done` holds, for commands that get no reply.
    pub fn wait_for(&self, done: impl Fn(&FakeClock) -> bool) {
        let started = Instant::now();
        while !done(self) {
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "fake clock never saw the expected traffic"
            );
            thread::sleep(Duration::from_millis(5));
        }
    }
}

fn arity(op: u8) -> usize {
    match op {
        opcode::MUTEX_DESTROY
        | opcode::MUTEX_LOCK
        | opcode::MUTEX_UNLOCK
        | opcode::COND_DESTROY
        | opcode::SIGNAL
        | opcode::BROADCAST => 1,
        opcode::WAIT => 2,
        opcode::TIMED_WAIT | opcode::DELAY => 4,
        _ => 0,
    }
}

fn serve(mut stream: TcpStream, shared: Arc<Shared>) {
    let Ok(thread) = read_name(&mut stream) else {
        return;
    };
    shared.hellos.lock().push(thread.clone());

    while let Ok(op) = read_u8(&mut stream) {
        let mut args = Vec::new();
        for _ in 0..arity(op) {
            match read_i32(&mut stream) {
                Ok(value) => args.push(value),
                Err(_) => return,
            }
        }
        shared.requests.lock().push(Request {
            thread: thread.clone(),
            opcode: op,
            args,
        });

        let reply: Vec<i32> = match op {
            opcode::MUTEX_INIT | opcode::COND_INIT => {
                vec![shared.next_id.fetch_add(1, Ordering::SeqCst)]
            }
            opcode::TIMED_WAIT | opcode::DELAY => {
                vec![shared.timed_replies.lock().pop_front().unwrap_or(65)]
            }
            opcode::GET_TIME => vec![3, 250_000],
            opcode::MUTEX_DESTROY | opcode::COND_DESTROY | opcode::BROADCAST => vec![],
            opcode::QUIT => return,
            _ => vec![0],
        };
        for value in reply {
            if stream.write_all(&value.to_be_bytes()).is_err() {
                return;
            }
        }
    }
}
