//! World Map
//!
//! Coordinate-space facade over the chunk and column trees.
//!
//! ## Responsibilities
//! - Translate positions to addresses via the address codec
//! - Keep chunks and columns in separate trees: a column at (x, z) and a
//!   chunk at (x, 0, z) share an address but never each other's data
//! - Expose the store-wide commit
//!
//! ## Concurrency Contract
//! A `WorldMap` is shared by every connection without extra locking; the
//! trees synchronise internally. [`WorldMap::commit`] is global: it makes
//! the writes of *all* connections durable, including writes another
//! connection has not asked to commit yet.

use std::sync::Arc;

use crate::address::{ChunkPos, ColumnPos};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{Database, Tree, TreeId};

/// Chunk and column storage addressed by world coordinates
pub struct WorldMap {
    db: Arc<Database>,
    chunks: Tree,
    columns: Tree,
}

impl WorldMap {
    /// Open the map stored at `config.storage_path`
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.storage_path, config.compact_on_open)?;
        Ok(Self::with_database(db))
    }

    /// A map that is never written to disk
    pub fn in_memory() -> Self {
        Self::with_database(Database::in_memory())
    }

    pub fn with_database(db: Arc<Database>) -> Self {
        Self {
            chunks: db.tree(TreeId::Chunks),
            columns: db.tree(TreeId::Columns),
            db,
        }
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    pub fn contains_chunk(&self, pos: ChunkPos) -> Result<bool> {
        self.chunks.contains_key(pos.address())
    }

    /// Stored blob, or `None` if nothing was saved at `pos`
    pub fn get_chunk(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>> {
        self.chunks.get(pos.address())
    }

    /// Store `data` at `pos`, replacing any previous blob
    pub fn save_chunk(&self, pos: ChunkPos, data: Vec<u8>) -> Result<()> {
        self.chunks.put(pos.address(), data)
    }

    /// Every stored chunk position, in ascending address order
    pub fn list_chunks(&self) -> Result<Vec<ChunkPos>> {
        Ok(self
            .chunks
            .keys()?
            .into_iter()
            .map(ChunkPos::from_address)
            .collect())
    }

    // =========================================================================
    // Columns
    // =========================================================================

    pub fn contains_column(&self, pos: ColumnPos) -> Result<bool> {
        self.columns.contains_key(pos.address())
    }

    pub fn get_column(&self, pos: ColumnPos) -> Result<Option<Vec<u8>>> {
        self.columns.get(pos.address())
    }

    pub fn save_column(&self, pos: ColumnPos, data: Vec<u8>) -> Result<()> {
        self.columns.put(pos.address(), data)
    }

    pub fn list_columns(&self) -> Result<Vec<ColumnPos>> {
        Ok(self
            .columns
            .keys()?
            .into_iter()
            .map(ColumnPos::from_address)
            .collect())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Durability checkpoint for the whole store (see the module docs)
    pub fn commit(&self) -> Result<()> {
        self.db.commit()
    }

    /// Close the underlying store; uncommitted writes are discarded
    pub fn shutdown(&self) -> Result<()> {
        self.db.close()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
