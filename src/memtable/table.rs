//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Fixed per-entry overhead counted on top of the value length (the key)
const KEY_SIZE: usize = std::mem::size_of::<i64>();

/// In-memory ordered map from address to blob
pub struct MemTable {
    data: RwLock<BTreeMap<i64, Vec<u8>>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: i64) -> Option<Vec<u8>> {
        self.data.read().get(&key).cloned()
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.data.read().contains_key(&key)
    }

    /// Insert or overwrite a value (write lock)
    ///
    /// Returns the approximate table size after the write.
    pub fn put(&self, key: i64, value: Vec<u8>) -> usize {
        let added = value.len();
        let mut data = self.data.write();
        // size is only written while the write lock is held
        let size = self.size.load(Ordering::Relaxed);
        let new_size = match data.insert(key, value) {
            Some(old) => size - old.len() + added,
            None => size + KEY_SIZE + added,
        };
        self.size.store(new_size, Ordering::Relaxed);
        new_size
    }

    /// All keys in ascending order, as of the call
    pub fn keys(&self) -> Vec<i64> {
        self.data.read().keys().copied().collect()
    }

    /// Snapshot of all entries in ascending key order
    pub fn entries(&self) -> Vec<(i64, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
