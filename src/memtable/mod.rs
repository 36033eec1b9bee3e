//! MemTable Module
//!
//! In-memory ordered table holding every live entry of one keyspace.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for diagnostics and compaction decisions
//! - Ordered iteration (ascending address) for listing and snapshots
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (listing replies use ascending address order)
//! - Simple and correct first, optimize later

mod table;

pub use table::MemTable;
