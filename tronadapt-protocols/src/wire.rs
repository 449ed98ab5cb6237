//! ## tronadapt-protocols::wire
//! Primitive encoders shared by both protocols.
//!
//! Integers are big-endian and fixed width. Strings are one length byte
//! followed by that many raw bytes, with no terminator.

use std::io::{self, Read};
use std::time::Duration;

use bytes::BufMut;
use thiserror::Error;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("name is {len} bytes long, at most 255 fit into a length byte")]
    NameTooLong { len: usize },
    #[error("duration of {0:?} does not fit into 32-bit seconds")]
    DurationOverflow(Duration),
    #[error("{0} parameters do not fit into a 16-bit count")]
    TooManyParams(usize),
    #[error("negative parameter count {0} in action frame")]
    NegativeParamCount(i16),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Writes a length-prefixed string.
pub fn put_name<B: BufMut>(buf: &mut B, name: &str) -> Result<(), CodecError> {
    let len = u8::try_from(name.len()).map_err(|_| CodecError::NameTooLong { len: name.len() })?;
    buf.put_u8(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// Writes a duration as `[i32 seconds][i32 microseconds]`.
pub fn put_duration<B: BufMut>(buf: &mut B, value: Duration) -> Result<(), CodecError> {
    let secs = i32::try_from(value.as_secs()).map_err(|_| CodecError::DurationOverflow(value))?;
    buf.put_i32(secs);
    buf.put_i32(value.subsec_micros() as i32);
    Ok(())
}

pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut raw = [0u8; 1];
    reader.read_exact(&mut raw)?;
    Ok(raw[0])
}

pub fn read_i16<R: Read>(reader: &mut R) -> io::Result<i16> {
    let mut raw = [0u8; 2];
    reader.read_exact(&mut raw)?;
    Ok(i16::from_be_bytes(raw))
}

pub fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut raw = [0u8; 4];
    reader.read_exact(&mut raw)?;
    Ok(i32::from_be_bytes(raw))
}

pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut raw = [0u8; 4];
    reader.read_exact(&mut raw)?;
    Ok(u32::from_be_bytes(raw))
}

/// Reads a length-prefixed string. Bytes that are not valid UTF-8 are
/// replaced rather than rejected, the peer sends raw bytes.
pub fn read_name<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_u8(reader)? as usize;
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Reads a `[i32 seconds][i32 microseconds]` pair. Negative fields are
/// clamped to zero.
pub fn read_duration<R: Read>(reader: &mut R) -> io::Result<Duration> {
    let secs = read_i32(reader)?.max(0) as u64;
    let micros = read_i32(reader)?.max(0) as u64;
    Ok(Duration::from_secs(secs) + Duration::from_micros(micros))
}
