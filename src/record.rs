//! Length-prefixed record framing: `uint32 LE length ‖ bytes[length]`.

use crate::{Error, Result};

/// Prefix size of a record: a little-endian `u32` length.
pub const PREFIX_SIZE: usize = 4;

/// Encodes one record (length prefix + payload) into a fresh buffer.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Reads a single record's length prefix from `bytes`, returning the
/// payload length. Callers use this to decide how many more bytes to read
/// before slicing out the payload.
pub fn decode_prefix(bytes: &[u8]) -> Result<u32> {
    if bytes.len() < PREFIX_SIZE {
        return Err(Error::Corrupt("truncated record length prefix"));
    }
    Ok(u32::from_le_bytes(
        bytes[0..PREFIX_SIZE].try_into().expect("slice length"),
    ))
}
