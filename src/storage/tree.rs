//! Tree handles
//!
//! A [`Tree`] is one named keyspace of a [`Database`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::Database;

/// Identifies one of the two trees in a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeId {
    Chunks,
    Columns,
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeId::Chunks => f.write_str("chunks"),
            TreeId::Columns => f.write_str("columns"),
        }
    }
}

/// Ordered map from address to blob, backed by a shared [`Database`]
///
/// Cloning is cheap; clones address the same tree.
#[derive(Clone)]
pub struct Tree {
    db: Arc<Database>,
    id: TreeId,
}

impl Tree {
    pub(super) fn new(db: Arc<Database>, id: TreeId) -> Self {
        Self { db, id }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        self.db.get(self.id, key)
    }

    /// Insert or overwrite; durable after the next [`Database::commit`]
    pub fn put(&self, key: i64, value: Vec<u8>) -> Result<()> {
        self.db.put(self.id, key, value)
    }

    pub fn contains_key(&self, key: i64) -> Result<bool> {
        self.db.contains_key(self.id, key)
    }

    /// Every key in ascending order, as of the call
    pub fn keys(&self) -> Result<Vec<i64>> {
        self.db.keys(self.id)
    }

    pub fn len(&self) -> Result<usize> {
        self.db.entry_count(self.id)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
