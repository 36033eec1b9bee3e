//! Write-Ahead Log (WAL) Module
//!
//! The journal behind the chunk and column trees.
//!
//! ## Responsibilities
//! - Append committed writes as CRC-protected entries
//! - Log Sequence Numbers (LSN) for ordering
//! - Commit markers delimiting durable batches
//! - Crash recovery: replay committed batches, drop the torn/uncommitted tail
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ ...                                     │
//! ├─────────────────────────────────────────┤
//! │ Commit marker                           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode encoding of an [`Operation`]; the CRC covers it.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::WalWriter;
pub use reader::WalReader;
pub use recovery::{WalRecovery, RecoveryResult};
