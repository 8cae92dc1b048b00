// WAL reader: recovering records and stopping at a torn tail.

use std::io::Write;

use recordkv::wal::reader::WALReader;
use recordkv::wal::writer::WALWriter;
use recordkv::wal::{RecordType, SyncPolicy, WALRecord};

fn record(i: usize) -> WALRecord {
    WALRecord::put(format!("key{}", i).into_bytes(), format!("val{}", i).into_bytes())
}

/// Helper: write `batches` batches of two puts each, return the path.
fn write_batches(dir: &tempfile::TempDir, batches: usize) -> std::path::PathBuf {
    let path = dir.path().join("000001.wal");
    let mut writer = WALWriter::new(&path, SyncPolicy::EveryWrite).unwrap();
    for b in 0..batches {
        let records = [record(b * 2), record(b * 2 + 1)];
        writer.append_batch(&records, b as u64 + 1).unwrap();
    }
    path
}

fn read_all(path: &std::path::Path) -> Vec<WALRecord> {
    let reader = WALReader::new(path).unwrap();
    reader.iter().map(|r| r.unwrap()).collect()
}

// =============================================================================
// Test 1: Batches read back as puts followed by a commit
// =============================================================================
#[test]
fn read_batches_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batches(&dir, 2);

    let records = read_all(&path);
    let types: Vec<RecordType> = records.iter().map(|r| r.record_type).collect();
    assert_eq!(
        types,
        vec![
            RecordType::Put,
            RecordType::Put,
            RecordType::Commit,
            RecordType::Put,
            RecordType::Put,
            RecordType::Commit,
        ]
    );
    assert_eq!(records[3].key, b"key2");
    assert_eq!(records[5].sequence().unwrap(), 2);
}

// =============================================================================
// Test 2: Truncated tail yields everything before it
// =============================================================================
#[test]
fn truncated_last_record_yields_preceding() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batches(&dir, 2);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let mut iter = reader.iter();
    let records: Vec<WALRecord> = iter.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 5);
    assert!(iter.offset() < reader.len());
}

// =============================================================================
// Test 3: Corrupt CRC in the middle stops iteration there
// =============================================================================
#[test]
fn corrupt_crc_stops_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batches(&dir, 2);

    let offset = record(0).encoded_size() + record(1).encoded_size();
    let mut raw = std::fs::read(&path).unwrap();
    raw[offset] ^= 0x01;
    std::fs::write(&path, &raw).unwrap();

    let records = read_all(&path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].value, b"val1");
}

// =============================================================================
// Test 4: Empty file and partial header yield nothing
// =============================================================================
#[test]
fn empty_and_partial_files_yield_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let empty = dir.path().join("empty.wal");
    std::fs::File::create(&empty).unwrap();
    assert!(read_all(&empty).is_empty());
    assert!(WALReader::new(&empty).unwrap().is_empty());

    let partial = dir.path().join("partial.wal");
    let mut file = std::fs::File::create(&partial).unwrap();
    file.write_all(&[0xDE, 0xAD, 0x00]).unwrap();
    file.sync_all().unwrap();
    assert!(read_all(&partial).is_empty());
}
