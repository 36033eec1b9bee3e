//! Error types for ChunkMap
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ChunkMapError
pub type Result<T> = std::result::Result<T, ChunkMapError>;

/// Unified error type for ChunkMap operations
#[derive(Debug, Error)]
pub enum ChunkMapError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store is closed")]
    StoreClosed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer sent a tag with the reply flag set
    #[error("Received a reply packet from peer: tag 0x{0:02x}")]
    ReplyPacket(u8),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for ChunkMapError {
    fn from(e: bincode::Error) -> Self {
        ChunkMapError::Serialization(e.to_string())
    }
}

impl ChunkMapError {
    /// True when the error means the peer went away (EOF, reset, abort, broken pipe)
    pub fn is_disconnect(&self) -> bool {
        match self {
            ChunkMapError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
