//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use serde::{Deserialize, Serialize};

use crate::error::{ChunkMapError, Result};
use crate::storage::TreeId;

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload accepted when reading an entry (64 MB)
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Store a blob under an address in one tree
    Put { tree: TreeId, key: i64, value: Vec<u8> },

    /// Everything logged before this marker is durable
    Commit,
}

impl Operation {
    /// Largest `Put` value whose entry still fits in [`MAX_ENTRY_SIZE`]
    pub fn max_put_value_len() -> Result<usize> {
        let empty = Operation::Put {
            tree: TreeId::Chunks,
            key: 0,
            value: Vec::new(),
        };
        let overhead = bincode::serialized_size(&empty)? as usize;
        Ok(MAX_ENTRY_SIZE as usize - overhead)
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self { lsn, operation }
    }

    /// Encode header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&self.operation)?;
        if payload.len() > MAX_ENTRY_SIZE as usize {
            return Err(ChunkMapError::Serialization(format!(
                "WAL entry too large: {} bytes (max {})",
                payload.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_be_bytes());
        bytes.extend_from_slice(&Self::compute_crc(&payload).to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode one entry from the front of `bytes`
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(ChunkMapError::WalCorruption(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE]);
        if len > MAX_ENTRY_SIZE {
            return Err(ChunkMapError::WalCorruption(format!(
                "Entry length {} exceeds maximum {}",
                len, MAX_ENTRY_SIZE
            )));
        }

        let total = HEADER_SIZE + len as usize;
        if bytes.len() < total {
            return Err(ChunkMapError::WalCorruption(format!(
                "Incomplete payload: expected {} bytes, got {}",
                len,
                bytes.len() - HEADER_SIZE
            )));
        }

        let payload = &bytes[HEADER_SIZE..total];
        Ok((Self::from_payload(lsn, crc, payload)?, total))
    }

    /// Split a header into (lsn, crc, len)
    pub(crate) fn parse_header(header: &[u8]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let crc = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let len = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
        (u64::from_be_bytes(lsn), crc, len)
    }

    /// Verify the checksum and decode the operation
    pub(crate) fn from_payload(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(payload);
        if actual != crc {
            return Err(ChunkMapError::WalCorruption(format!(
                "CRC mismatch at LSN {}: stored 0x{:08x}, computed 0x{:08x}",
                lsn, crc, actual
            )));
        }

        let operation = bincode::deserialize(payload).map_err(|e| {
            ChunkMapError::WalCorruption(format!("Undecodable entry at LSN {}: {}", lsn, e))
        })?;
        Ok(Self { lsn, operation })
    }

    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }
}
