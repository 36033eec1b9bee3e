//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ChunkMapError, Result};
use super::{WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Byte offset just past the last entry read successfully
    position: u64,

    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file, and
    /// `Err(WalCorruption)` for a torn or damaged entry.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.position >= self.file_len {
            return Ok(None);
        }

        let remaining = self.file_len - self.position;
        if remaining < HEADER_SIZE as u64 {
            return Err(self.torn("header"));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let (lsn, crc, len) = WalEntry::parse_header(&header);

        if len > MAX_ENTRY_SIZE {
            return Err(ChunkMapError::WalCorruption(format!(
                "Entry length {} at offset {} exceeds maximum {}",
                len, self.position, MAX_ENTRY_SIZE
            )));
        }
        if remaining < (HEADER_SIZE as u64) + len as u64 {
            return Err(self.torn("payload"));
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload)?;
        let entry = WalEntry::from_payload(lsn, crc, &payload)?;

        self.position += (HEADER_SIZE as u64) + len as u64;
        Ok(Some(entry))
    }

    /// Byte offset just past the last valid entry
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Iterate over entries until end of file or the first damaged entry
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    fn torn(&self, part: &str) -> ChunkMapError {
        ChunkMapError::WalCorruption(format!(
            "Torn {} at offset {} ({} bytes left)",
            part,
            self.position,
            self.file_len - self.position
        ))
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
