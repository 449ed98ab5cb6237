//! ## tronadapt-protocols::clock
//! Virtual clock coordinator protocol.
//!
//! A client opens one TCP connection per thread and introduces itself with
//! its length-prefixed name. Each request afterwards is a single command
//! byte followed by fixed-width big-endian fields. Requests are answered
//! with one `i32` status or payload, except destroy, broadcast and quit
//! which are one-way.

use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::wire::{put_duration, put_name, CodecError};

/// Command byte values.
pub mod opcode {
    pub const DEACTIVATE: u8 = 1;
    pub const ACTIVATE: u8 = 2;
    pub const MUTEX_INIT: u8 = 3;
    pub const MUTEX_DESTROY: u8 = 4;
    pub const MUTEX_LOCK: u8 = 5;
    pub const MUTEX_UNLOCK: u8 = 6;
    pub const COND_INIT: u8 = 7;
    pub const COND_DESTROY: u8 = 8;
    pub const WAIT: u8 = 9;
    pub const TIMED_WAIT: u8 = 10;
    /// Timed wait relative to the current virtual time.
    pub const DELAY: u8 = 11;
    /// Reserved for a single-waiter wake-up the coordinator does not serve.
    pub const SIGNAL: u8 = 12;
    pub const BROADCAST: u8 = 13;
    pub const GET_TIME: u8 = 14;
    pub const QUIT: u8 = 127;
}

/// Reply code values.
pub mod reply {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = 64;
    pub const TIMED_OUT: i32 = 65;
    pub const INTERRUPT: i32 = 66;
    pub const BUSY: i32 = 67;
}

/// A request sent to the clock coordinator.
///
/// Identifiers are the ones handed out by `MutexInit`/`CondInit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Deactivate,
    Activate,
    MutexInit,
    MutexDestroy { mutex: i32 },
    MutexLock { mutex: i32 },
    MutexUnlock { mutex: i32 },
    CondInit,
    CondDestroy { cond: i32 },
    Wait { cond: i32, mutex: i32 },
    /// Wait until an absolute virtual time.
    TimedWait { cond: i32, mutex: i32, deadline: Duration },
    /// Wait for a duration measured from the current virtual time.
    Delay { cond: i32, mutex: i32, delay: Duration },
    Broadcast { cond: i32 },
    GetTime,
    Quit,
}

impl ClockCommand {
    pub fn opcode(&self) -> u8 {
        match self {
            ClockCommand::Deactivate => opcode::DEACTIVATE,
            ClockCommand::Activate => opcode::ACTIVATE,
            ClockCommand::MutexInit => opcode::MUTEX_INIT,
            ClockCommand::MutexDestroy { .. } => opcode::MUTEX_DESTROY,
            ClockCommand::MutexLock { .. } => opcode::MUTEX_LOCK,
            ClockCommand::MutexUnlock { .. } => opcode::MUTEX_UNLOCK,
            ClockCommand::CondInit => opcode::COND_INIT,
            ClockCommand::CondDestroy { .. } => opcode::COND_DESTROY,
            ClockCommand::Wait { .. } => opcode::WAIT,
            ClockCommand::TimedWait { .. } => opcode::TIMED_WAIT,
            ClockCommand::Delay { .. } => opcode::DELAY,
            ClockCommand::Broadcast { .. } => opcode::BROADCAST,
            ClockCommand::GetTime => opcode::GET_TIME,
            ClockCommand::Quit => opcode::QUIT,
        }
    }

    /// Whether the coordinator answers this command.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            ClockCommand::MutexDestroy { .. }
                | ClockCommand::CondDestroy { .. }
                | ClockCommand::Broadcast { .. }
                | ClockCommand::Quit
        )
    }

    /// Appends the wire form of this command to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u8(self.opcode());
        match *self {
            ClockCommand::Deactivate
            | ClockCommand::Activate
            | ClockCommand::MutexInit
            | ClockCommand::CondInit
            | ClockCommand::GetTime
            | ClockCommand::Quit => {}
            ClockCommand::MutexDestroy { mutex }
            | ClockCommand::MutexLock { mutex }
            | ClockCommand::MutexUnlock { mutex } => buf.put_i32(mutex),
            ClockCommand::CondDestroy { cond }
            | ClockCommand::Broadcast { cond } => buf.put_i32(cond),
            ClockCommand::Wait { cond, mutex } => {
                buf.put_i32(cond);
                buf.put_i32(mutex);
            }
            ClockCommand::TimedWait {
                cond,
                mutex,
                deadline: time,
            }
            | ClockCommand::Delay {
                cond,
                mutex,
                delay: time,
            } => {
                buf.put_i32(cond);
                buf.put_i32(mutex);
                put_duration(buf, time)?;
            }
        }
        Ok(())
    }
}

/// Encodes the greeting a thread sends right after connecting.
pub fn encode_hello(name: &str, buf: &mut BytesMut) -> Result<(), CodecError> {
    put_name(buf, name)
}

/// Decoded status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error,
    TimedOut,
    Interrupted,
    Busy,
    Unknown(i32),
}

impl Reply {
    pub fn from_code(code: i32) -> Self {
        match code {
            reply::OK => Reply::Ok,
            reply::ERROR => Reply::Error,
            reply::TIMED_OUT => Reply::TimedOut,
            reply::INTERRUPT => Reply::Interrupted,
            reply::BUSY => Reply::Busy,
            other => Reply::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            Reply::Ok => reply::OK,
            Reply::Error => reply::ERROR,
            Reply::TimedOut => reply::TIMED_OUT,
            Reply::Interrupted => reply::INTERRUPT,
            Reply::Busy => reply::BUSY,
            Reply::Unknown(code) => code,
        }
    }
}
