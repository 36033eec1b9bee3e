//! # ChunkMap
//!
//! A network-accessible store for world data blobs:
//! - Chunks addressed by (x, y, z), columns addressed by (x, z)
//! - Coordinates bit-packed into 64-bit addresses
//! - Compact binary protocol over TCP, one thread per connection
//! - Journal with store-wide commit and crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │          (accept loop + one thread per connection)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Request / Reply
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      WorldMap                                │
//! │        (positions → addresses via the address codec)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ chunks tree │          │columns tree │
//!   │ (MemTable)  │          │ (MemTable)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬────────────┘
//!                       ▼ commit
//!                ┌─────────────┐
//!                │     WAL     │
//!                │  (journal)  │
//!                └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod map;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ChunkMapError, Result};
pub use config::Config;
pub use address::{ChunkPos, ColumnPos, Domain};
pub use map::WorldMap;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ChunkMap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
