//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,

    /// LSN of the last appended entry
    current_lsn: u64,
}

impl WalWriter {
    /// Open a WAL file for appending, creating it if missing
    ///
    /// `last_lsn` is the LSN of the last valid entry already in the file.
    pub fn open(path: &Path, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            current_lsn: last_lsn,
        })
    }

    /// Create an empty WAL file, replacing any existing one
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            current_lsn: 0,
        })
    }

    /// Append an operation, returning its LSN
    ///
    /// The entry is buffered; call [`WalWriter::sync`] to make it durable.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        self.writer.write_all(&bytes)?;
        self.current_lsn = lsn;
        Ok(lsn)
    }

    /// Flush buffered entries and fsync
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }
}
