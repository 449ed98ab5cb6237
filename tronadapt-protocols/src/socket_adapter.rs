//! ## tronadapt-protocols::socket_adapter
//! Tester-facing action protocol.
//!
//! A connection starts with configuration requests (command byte plus
//! payload, each answered by the tester) and switches to steady state after
//! [`ConfigRequest::TestExec`] succeeds. In steady state both directions
//! exchange action frames:
//!
//! ```text
//! [i32 channel][i16 count][i32 param] * count
//! ```
//!
//! A leading 32-bit value with the top bit set is an acknowledgement
//! carrying a count in the remaining bits instead.

use std::io::Read;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::wire::{put_duration, put_name, read_i16, read_i32, read_u32, CodecError};

/// Command byte values.
pub mod opcode {
    pub const INPUT_ENCODING: u8 = 1;
    pub const OUTPUT_ENCODING: u8 = 2;
    pub const VAR_TO_INPUT: u8 = 3;
    pub const VAR_TO_OUTPUT: u8 = 4;
    pub const TIME_UNIT: u8 = 5;
    pub const TIMEOUT: u8 = 6;
    pub const TEST_EXEC: u8 = 64;
    pub const GET_ERROR: u8 = 127;
}

/// Marks a steady-state value as an acknowledgement count.
pub const ACK_BIT: u32 = 1 << 31;

/// Channel identifier handed out by the tester.
pub type ChannelId = i32;

/// A configuration-phase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRequest<'a> {
    /// Register an input channel; answered with its id or a negative code.
    InputEncoding { channel: &'a str },
    /// Register an output channel; answered with its id or a negative code.
    OutputEncoding { channel: &'a str },
    VarToInput { channel: ChannelId, variable: &'a str },
    VarToOutput { channel: ChannelId, variable: &'a str },
    /// Duration of one model time unit.
    TimeUnit(Duration),
    /// Number of model time units before testing stops.
    Timeout(i32),
    /// Finish configuration; answered with an error string, empty on success.
    TestExec,
    /// Explain a negative reply code; answered with a string.
    GetError(i32),
}

impl ConfigRequest<'_> {
    pub fn opcode(&self) -> u8 {
        match self {
            ConfigRequest::InputEncoding { .. } => opcode::INPUT_ENCODING,
            ConfigRequest::OutputEncoding { .. } => opcode::OUTPUT_ENCODING,
            ConfigRequest::VarToInput { .. } => opcode::VAR_TO_INPUT,
            ConfigRequest::VarToOutput { .. } => opcode::VAR_TO_OUTPUT,
            ConfigRequest::TimeUnit(_) => opcode::TIME_UNIT,
            ConfigRequest::Timeout(_) => opcode::TIMEOUT,
            ConfigRequest::TestExec => opcode::TEST_EXEC,
            ConfigRequest::GetError(_) => opcode::GET_ERROR,
        }
    }

    /// Whether the tester answers with a string rather than an `i32`.
    pub fn expects_text(&self) -> bool {
        matches!(self, ConfigRequest::TestExec | ConfigRequest::GetError(_))
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u8(self.opcode());
        match *self {
            ConfigRequest::InputEncoding { channel } | ConfigRequest::OutputEncoding { channel } => {
                put_name(buf, channel)?
            }
            ConfigRequest::VarToInput { channel, variable }
            | ConfigRequest::VarToOutput { channel, variable } => {
                buf.put_i32(channel);
                put_name(buf, variable)?;
            }
            ConfigRequest::TimeUnit(unit) => put_duration(buf, unit)?,
            ConfigRequest::Timeout(units) => buf.put_i32(units),
            ConfigRequest::TestExec => {}
            ConfigRequest::GetError(code) => buf.put_i32(code),
        }
        Ok(())
    }
}

/// Encodes an output action frame.
pub fn encode_action(
    channel: ChannelId,
    params: &[i32],
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let count = i16::try_from(params.len()).map_err(|_| CodecError::TooManyParams(params.len()))?;
    buf.reserve(6 + 4 * params.len());
    buf.put_i32(channel);
    buf.put_i16(count);
    for param in params {
        buf.put_i32(*param);
    }
    Ok(())
}

/// Encodes an acknowledgement for `count` received actions.
pub fn encode_ack(count: u32, buf: &mut BytesMut) {
    buf.put_u32(ACK_BIT | (count & !ACK_BIT));
}

/// A steady-state frame received from the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// The tester registered `n` of our outputs.
    Ack(u32),
    /// An input action.
    Input {
        channel: ChannelId,
        params: Vec<i32>,
    },
}

impl InboundFrame {
    /// Classifies the leading 32-bit value of a frame.
    ///
    /// Returns `Err(channel)` when the value starts an input action whose
    /// parameters still have to be read.
    pub fn classify(head: u32) -> Result<InboundFrame, ChannelId> {
        if head & ACK_BIT != 0 {
            Ok(InboundFrame::Ack(head & !ACK_BIT))
        } else {
            Err(head as ChannelId)
        }
    }

    /// Reads one complete frame, blocking until it is available.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<InboundFrame, CodecError> {
        let channel = match Self::classify(read_u32(reader)?) {
            Ok(ack) => return Ok(ack),
            Err(channel) => channel,
        };
        let count = read_i16(reader)?;
        if count < 0 {
            return Err(CodecError::NegativeParamCount(count));
        }
        let mut params = Vec::with_capacity(count as usize);
        for _ in 0..count {
            params.push(read_i32(reader)?);
        }
        Ok(InboundFrame::Input { channel, params })
    }
}
