//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{ChunkMapError, Result};
use super::{Operation, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of committed put entries recovered
    pub entries_recovered: u64,

    /// Entries dropped: uncommitted puts after the last marker, plus a damaged entry if any
    pub entries_discarded: u64,

    /// LSN of the last commit marker (0 if none)
    pub last_lsn: u64,

    /// Whether the file was cut back to the end of the last committed batch
    pub was_truncated: bool,
}

/// Outcome of a scan, shared by `recover` and `verify`
struct Scan {
    committed: Vec<WalEntry>,
    committed_end: u64,
    file_len: u64,
    result: RecoveryResult,
}

impl WalRecovery {
    /// Recover committed entries from a WAL file
    ///
    /// This will:
    /// 1. Read entries until end of file or the first damaged entry
    /// 2. Keep puts that are followed by a commit marker
    /// 3. Truncate the file after the last commit marker
    /// 4. Return the committed puts in log order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut scan = Self::scan(path)?;

        if scan.committed_end < scan.file_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scan.committed_end)?;
            file.sync_all()?;
            scan.result.was_truncated = true;
            tracing::warn!(
                "WAL {} truncated from {} to {} bytes",
                path.display(),
                scan.file_len,
                scan.committed_end
            );
        }

        Ok((scan.committed, scan.result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let scan = Self::scan(path)?;
        let mut result = scan.result;
        result.was_truncated = scan.committed_end < scan.file_len;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<Scan> {
        let mut reader = WalReader::open(path)?;
        let file_len = reader.file_len();

        let mut committed = Vec::new();
        let mut batch = Vec::new();
        let mut committed_end = 0;
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => match entry.operation {
                    Operation::Commit => {
                        result.entries_recovered += batch.len() as u64;
                        committed.append(&mut batch);
                        committed_end = reader.position();
                        result.last_lsn = entry.lsn;
                    }
                    Operation::Put { .. } => batch.push(entry),
                },
                Ok(None) => break,
                Err(ChunkMapError::WalCorruption(msg)) => {
                    tracing::warn!("WAL {}: {}", path.display(), msg);
                    result.entries_discarded += 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.entries_discarded += batch.len() as u64;

        Ok(Scan {
            committed,
            committed_end,
            file_len,
            result,
        })
    }
}
