//! Storage Module
//!
//! The ordered key→bytes store the chunk map is persisted in.
//!
//! ## Responsibilities
//! - Two independent ordered trees (chunks, columns) keyed by packed address
//! - Writes visible to every reader immediately
//! - Store-wide commit: all pending writes of both trees become durable together
//! - Journal recovery and compaction on open
//!
//! ## Layout
//! ```text
//!            ┌────────────────────────────────┐
//!            │            Database            │
//!            │  dirty set ── commit ──► WAL   │
//!            └───────┬────────────────┬───────┘
//!                    │                │
//!             ┌──────▼─────┐   ┌──────▼─────┐
//!             │ chunks     │   │ columns    │
//!             │ (MemTable) │   │ (MemTable) │
//!             └────────────┘   └────────────┘
//! ```

mod database;
mod tree;

pub use database::Database;
pub use tree::{Tree, TreeId};
