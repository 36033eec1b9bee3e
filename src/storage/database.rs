//! Database
//!
//! Owns both trees and the journal they are committed to.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ChunkMapError, Result};
use crate::memtable::MemTable;
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{Tree, TreeId};

/// Ordered two-tree store with a store-wide commit
///
/// ## Concurrency
/// - Reads take only the owning memtable's read lock
/// - Writes hold `dirty` while updating the memtable, so the dirty set and
///   the table never disagree
/// - `commit` holds `dirty` and `journal` for its whole duration; it captures
///   the writes of every caller, not just its own
pub struct Database {
    /// Journal file, `None` for an in-memory database
    journal_path: Option<PathBuf>,

    journal: Mutex<Option<WalWriter>>,

    chunks: MemTable,
    columns: MemTable,

    /// Keys written since the last commit
    dirty: Mutex<BTreeSet<(TreeId, i64)>>,

    closed: AtomicBool,
}

impl Database {
    /// File used when the storage path is a directory
    pub const DEFAULT_FILENAME: &'static str = "cubes.dim0.db";

    /// Open or create a journal-backed database
    ///
    /// On startup:
    /// 1. Resolve the journal path (directory → `cubes.dim0.db` inside it)
    /// 2. Recover committed entries, dropping any uncommitted tail
    /// 3. Replay them into the trees
    /// 4. Compact the journal if it holds superseded entries
    pub fn open(path: &Path, compact_on_open: bool) -> Result<Arc<Self>> {
        let journal_path = Self::resolve_path(path);
        if let Some(parent) = journal_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Self::empty(Some(journal_path.clone()));

        let last_lsn = if journal_path.exists() {
            let (entries, result) = WalRecovery::recover(&journal_path)?;
            tracing::info!(
                "Journal {}: {} entries recovered, {} discarded, last_lsn={}",
                journal_path.display(),
                result.entries_recovered,
                result.entries_discarded,
                result.last_lsn
            );

            for entry in entries {
                if let Operation::Put { tree, key, value } = entry.operation {
                    db.table(tree).put(key, value);
                }
            }
            result.last_lsn
        } else {
            tracing::info!("Creating journal {}", journal_path.display());
            0
        };

        // LSNs number every entry in the file; a compact journal holds one put
        // per live key plus a single commit marker
        let compacted_len = db.live_entries() as u64 + 1;
        *db.journal.lock() = Some(WalWriter::open(&journal_path, last_lsn)?);

        let db = Arc::new(db);
        if compact_on_open && last_lsn > compacted_len {
            db.compact()?;
        }
        Ok(db)
    }

    /// Create a database that lives only in memory; `commit` is a no-op
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::empty(None))
    }

    fn empty(journal_path: Option<PathBuf>) -> Self {
        Self {
            journal_path,
            journal: Mutex::new(None),
            chunks: MemTable::new(),
            columns: MemTable::new(),
            dirty: Mutex::new(BTreeSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve a storage path to the journal file
    pub fn resolve_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(Self::DEFAULT_FILENAME)
        } else {
            path.to_path_buf()
        }
    }

    /// Get a handle to one of the trees
    pub fn tree(self: &Arc<Self>, id: TreeId) -> Tree {
        Tree::new(Arc::clone(self), id)
    }

    // =========================================================================
    // Tree operations
    // =========================================================================

    pub fn get(&self, tree: TreeId, key: i64) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.table(tree).get(key))
    }

    pub fn put(&self, tree: TreeId, key: i64, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let mut dirty = self.dirty.lock();
        self.table(tree).put(key, value);
        dirty.insert((tree, key));
        Ok(())
    }

    pub fn contains_key(&self, tree: TreeId, key: i64) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.table(tree).contains_key(key))
    }

    pub fn keys(&self, tree: TreeId) -> Result<Vec<i64>> {
        self.ensure_open()?;
        Ok(self.table(tree).keys())
    }

    pub fn entry_count(&self, tree: TreeId) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.table(tree).entry_count())
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Make every write since the last commit durable, across both trees
    ///
    /// The current value of each dirty key is appended, followed by a
    /// commit marker, then the journal is fsynced.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut dirty = self.dirty.lock();
        if dirty.is_empty() {
            return Ok(());
        }

        let mut journal = self.journal.lock();
        if let Some(writer) = journal.as_mut() {
            for &(tree, key) in dirty.iter() {
                let value = self.table(tree).get(key).ok_or_else(|| {
                    ChunkMapError::Storage(format!("dirty key {} missing from {}", key, tree))
                })?;
                writer.append(Operation::Put { tree, key, value })?;
            }
            let lsn = writer.append(Operation::Commit)?;
            writer.sync()?;
            tracing::debug!("Committed {} writes at LSN {}", dirty.len(), lsn);
        }

        dirty.clear();
        Ok(())
    }

    /// Rewrite the journal as one committed snapshot of both trees
    ///
    /// Pending writes are included, so compaction also commits them.
    pub fn compact(&self) -> Result<()> {
        self.ensure_open()?;
        let mut dirty = self.dirty.lock();
        let mut journal = self.journal.lock();

        let Some(path) = self.journal_path.as_deref() else {
            dirty.clear();
            return Ok(());
        };

        let tmp_path = path.with_extension("compact");
        let mut writer = WalWriter::create(&tmp_path)?;
        for tree in [TreeId::Chunks, TreeId::Columns] {
            for (key, value) in self.table(tree).entries() {
                writer.append(Operation::Put { tree, key, value })?;
            }
        }
        let lsn = writer.append(Operation::Commit)?;
        writer.sync()?;
        drop(writer);

        // drop the old handle before the rename replaces the file under it
        *journal = None;
        fs::rename(&tmp_path, path)?;
        *journal = Some(WalWriter::open(path, lsn)?);

        dirty.clear();
        tracing::info!("Compacted journal {} to {} entries", path.display(), lsn);
        Ok(())
    }

    /// Close the store
    ///
    /// Writes that were not committed are discarded. Every later operation
    /// fails with [`ChunkMapError::StoreClosed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut dirty = self.dirty.lock();
        if !dirty.is_empty() {
            tracing::warn!("Closing store with {} uncommitted writes", dirty.len());
        }
        dirty.clear();

        if let Some(mut writer) = self.journal.lock().take() {
            writer.sync()?;
        }
        self.chunks.clear();
        self.columns.clear();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal_path.as_deref()
    }

    /// Number of keys written since the last commit
    pub fn pending_count(&self) -> usize {
        self.dirty.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn live_entries(&self) -> usize {
        self.chunks.entry_count() + self.columns.entry_count()
    }

    fn table(&self, tree: TreeId) -> &MemTable {
        match tree {
            TreeId::Chunks => &self.chunks,
            TreeId::Columns => &self.columns,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ChunkMapError::StoreClosed)
        } else {
            Ok(())
        }
    }
}
