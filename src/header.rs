//! The segment header: a fixed 4096-byte block at the start of every
//! segment file. Byte layout, magic, and version are part of the on-disk
//! format and must not change without a version bump.

use crate::{Error, Result};

pub const HEADER_SIZE: usize = 4096;
pub const MAGIC: [u8; 4] = [0x17, 0xFF, 0x23, 0x05];
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Byte offset of the 8-byte transaction block within the header.
pub const TRANSACTION_BLOCK_OFFSET: usize = 8;

/// An in-memory view of a segment header. `offset_head` is the only field
/// ever rewritten after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentHeader {
    pub offset_head: u64,
}

impl SegmentHeader {
    pub fn new(offset_head: u64) -> Self {
        Self { offset_head }
    }

    /// Renders the full 4096-byte, zero-padded header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&VERSION);
        buf[TRANSACTION_BLOCK_OFFSET..TRANSACTION_BLOCK_OFFSET + 8]
            .copy_from_slice(&self.offset_head.to_le_bytes());
        buf
    }

    /// Parses and validates a header, checking magic and version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Corrupt("short segment header"));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::Corrupt("bad segment magic"));
        }
        if bytes[4..8] != VERSION {
            return Err(Error::Corrupt("unsupported segment version"));
        }
        let offset_head = u64::from_le_bytes(
            bytes[TRANSACTION_BLOCK_OFFSET..TRANSACTION_BLOCK_OFFSET + 8]
                .try_into()
                .expect("slice length"),
        );
        Ok(Self { offset_head })
    }

    /// Encodes just the 8-byte transaction block, for the commit-time
    /// rewrite of `[8, 16)` without touching the rest of the header.
    pub fn transaction_block_bytes(&self) -> [u8; 8] {
        self.offset_head.to_le_bytes()
    }
}
