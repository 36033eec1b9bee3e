//! Tests for the WAL
//!
//! These tests verify:
//! - Entry framing and checksum validation
//! - Reader stops cleanly at end of file
//! - Recovery keeps only committed batches
//! - Recovery truncates partial writes and uncommitted tails
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chunkmap::storage::TreeId;
use chunkmap::wal::{
    Operation, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE, MAX_ENTRY_SIZE,
};
use chunkmap::ChunkMapError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: i64, value: &[u8]) -> Operation {
    Operation::Put {
        tree: TreeId::Chunks,
        key,
        value: value.to_vec(),
    }
}

/// Write `batches` committed batches of `per_batch` puts
fn write_committed(path: &Path, batches: usize, per_batch: usize) {
    let mut writer = WalWriter::open(path, 0).unwrap();
    for b in 0..batches {
        for i in 0..per_batch {
            let key = (b * per_batch + i) as i64;
            writer.append(put(key, format!("value{}", key).as_bytes())).unwrap();
        }
        writer.append(Operation::Commit).unwrap();
    }
    writer.sync().unwrap();
}

fn append_bytes(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_serialize_deserialize() {
    let entry = WalEntry::new(9, put(-12, b"blob"));
    let bytes = entry.serialize().unwrap();

    let (decoded, consumed) = WalEntry::deserialize(&bytes).unwrap();

    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded, entry);
}

#[test]
fn test_entry_header_layout() {
    let bytes = WalEntry::new(1, Operation::Commit).serialize().unwrap();

    assert_eq!(&bytes[0..8], &1u64.to_be_bytes());
    let len = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);
}

#[test]
fn test_entry_crc_mismatch_detected() {
    let mut bytes = WalEntry::new(1, put(1, b"payload")).serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(ChunkMapError::WalCorruption(_))
    ));
}

// =============================================================================
// Writer / Reader Tests
// =============================================================================

#[test]
fn test_max_put_value_fills_an_entry_exactly() {
    let max = Operation::max_put_value_len().unwrap();

    for tree in [TreeId::Chunks, TreeId::Columns] {
        let entry = WalEntry::new(
            1,
            Operation::Put {
                tree,
                key: -42,
                value: vec![7; 1000],
            },
        );
        let payload_len = entry.serialize().unwrap().len() - HEADER_SIZE;
        assert_eq!(payload_len - 1000 + max, MAX_ENTRY_SIZE as usize);
    }
}

#[test]
fn test_writer_assigns_increasing_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 0).unwrap();

    assert_eq!(writer.append(put(1, b"a")).unwrap(), 1);
    assert_eq!(writer.append(put(2, b"b")).unwrap(), 2);
    assert_eq!(writer.append(Operation::Commit).unwrap(), 3);
    assert_eq!(writer.current_lsn(), 3);
}

#[test]
fn test_writer_continues_from_last_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 1, 2);

    let mut writer = WalWriter::open(&wal_path, 3).unwrap();
    assert_eq!(writer.append(Operation::Commit).unwrap(), 4);
}

#[test]
fn test_reader_reads_all_entries_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 2, 3);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(entries.len(), 8);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
    assert_eq!(entries[3].operation, Operation::Commit);
}

#[test]
fn test_reader_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_discarded, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_committed_batches() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 3, 4);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 12);
    assert_eq!(result.entries_recovered, 12);
    assert_eq!(result.entries_discarded, 0);
    assert_eq!(result.last_lsn, 15);
    assert!(!result.was_truncated);
    assert!(entries
        .iter()
        .all(|e| matches!(e.operation, Operation::Put { .. })));
}

#[test]
fn test_recover_preserves_operations() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 0).unwrap();
    writer
        .append(Operation::Put {
            tree: TreeId::Columns,
            key: -77,
            value: vec![1, 2, 3],
        })
        .unwrap();
    writer.append(Operation::Commit).unwrap();
    writer.sync().unwrap();

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(
        entries[0].operation,
        Operation::Put {
            tree: TreeId::Columns,
            key: -77,
            value: vec![1, 2, 3],
        }
    );
}

// =============================================================================
// Recover: Uncommitted / Damaged Tail Tests
// =============================================================================

#[test]
fn test_recover_discards_uncommitted_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 1, 2);
    let committed_len = fs::metadata(&wal_path).unwrap().len();

    let mut writer = WalWriter::open(&wal_path, 3).unwrap();
    writer.append(put(100, b"never committed")).unwrap();
    writer.append(put(101, b"never committed")).unwrap();
    writer.sync().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_discarded, 2);
    assert_eq!(result.last_lsn, 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), committed_len);
}

#[test]
fn test_recover_truncates_partial_write() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 2, 1);
    let committed_len = fs::metadata(&wal_path).unwrap().len();

    // half of an entry, as left by a crash mid-append
    let torn = WalEntry::new(5, put(9, b"torn")).serialize().unwrap();
    append_bytes(&wal_path, &torn[..torn.len() / 2]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_discarded, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), committed_len);
}

#[test]
fn test_recover_stops_at_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 1, 1);

    let mut bad = WalEntry::new(3, put(2, b"flipped")).serialize().unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0x01;
    append_bytes(&wal_path, &bad);
    append_bytes(&wal_path, &WalEntry::new(4, Operation::Commit).serialize().unwrap());

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    // the commit after the damaged entry cannot be trusted
    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 2);
    assert!(result.was_truncated);
}

#[test]
fn test_recovered_file_accepts_new_appends() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 1, 1);
    append_bytes(&wal_path, &[0xAB; 7]);

    let (_, result) = WalRecovery::recover(&wal_path).unwrap();
    let mut writer = WalWriter::open(&wal_path, result.last_lsn).unwrap();
    writer.append(put(50, b"after")).unwrap();
    writer.append(Operation::Commit).unwrap();
    writer.sync().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(result.last_lsn, 4);
    assert!(!result.was_truncated);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_reports_without_modifying() {
    let (_temp, wal_path) = setup_temp_wal();
    write_committed(&wal_path, 1, 3);
    append_bytes(&wal_path, &[0u8; 5]);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}
