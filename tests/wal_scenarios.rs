//! End-to-end lifecycle scenarios: create, append, crash-truncate, corrupt,
//! snapshot, and verify the WAL behaves as documented at each step.

use std::fs::OpenOptions;

use bytes::Bytes;
use raft_wal::{Entry, HardState, Snapshot, WalConfig, WalError, Wal};
use tempfile::tempdir;

fn small_config() -> WalConfig {
    WalConfig::new().with_segment_size(4096)
}

#[test]
fn s1_create_produces_exactly_segment_zero() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    Wal::create(&dir, b"app=v1", small_config()).unwrap();

    let names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["0000000000000000-0000000000000000.wal"]);
}

#[test]
fn s2_append_close_reopen_replays_metadata_state_and_entries() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    let mut wal = Wal::create(&dir, b"app=v1", small_config()).unwrap();

    wal.save(
        Some(HardState::new(1, 0)),
        &[
            Entry::new(1, 1, Bytes::from_static(b"x")),
            Entry::new(2, 1, Bytes::from_static(b"y")),
        ],
    )
    .unwrap();
    wal.close().unwrap();

    let mut reopened = Wal::open(&dir, Snapshot::new(0, 0), small_config()).unwrap();
    let result = reopened.read_all().unwrap();
    assert_eq!(result.metadata, b"app=v1");
    assert_eq!(result.state, Some(HardState::new(1, 0)));
    let indices: Vec<u64> = result.entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn s3_torn_tail_is_tolerated_and_zeroed_then_extended() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    let mut wal = Wal::create(&dir, b"app=v1", small_config()).unwrap();

    wal.save(
        Some(HardState::new(1, 0)),
        &[Entry::new(1, 1, Bytes::from_static(b"x"))],
    )
    .unwrap();
    wal.save(None, &[Entry::new(2, 1, Bytes::from_static(b"y"))])
        .unwrap();
    wal.close().unwrap();

    let segment_path = dir.join("0000000000000000-0000000000000000.wal");
    let len = std::fs::metadata(&segment_path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&segment_path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let mut reopened = Wal::open(&dir, Snapshot::new(0, 0), small_config()).unwrap();
    let result = reopened.read_all().unwrap();
    let indices: Vec<u64> = result.entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1]);

    reopened
        .save(None, &[Entry::new(2, 1, Bytes::from_static(b"y2"))])
        .unwrap();
    reopened.close().unwrap();

    let mut reopened_again = Wal::open(&dir, Snapshot::new(0, 0), small_config()).unwrap();
    let result = reopened_again.read_all().unwrap();
    assert_eq!(result.entries.len(), 2);
    assert_eq!(result.entries[1].index, 2);
    assert_eq!(result.entries[1].data, Bytes::from_static(b"y2"));
}

#[test]
fn s4_corrupted_payload_byte_is_crc_mismatch() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    let mut wal = Wal::create(&dir, b"app=v1", small_config()).unwrap();
    wal.save(
        Some(HardState::new(1, 0)),
        &[
            Entry::new(1, 1, Bytes::from_static(b"x")),
            Entry::new(2, 1, Bytes::from_static(b"y")),
        ],
    )
    .unwrap();
    wal.close().unwrap();

    let segment_path = dir.join("0000000000000000-0000000000000000.wal");
    let mut bytes = std::fs::read(&segment_path).unwrap();
    // The first entry's 1-byte payload sits a fixed offset past the
    // Crc/Metadata/Snapshot header records; flip it to break its chained CRC.
    let flip_at = bytes.len() / 2;
    bytes[flip_at] ^= 0xFF;
    std::fs::write(&segment_path, bytes).unwrap();

    let mut reopened = Wal::open(&dir, Snapshot::new(0, 0), small_config()).unwrap();
    let err = reopened.read_all().unwrap_err();
    assert!(matches!(err, WalError::CrcMismatch { .. }) || matches!(err, WalError::Io(_)));
}

#[test]
fn s5_snapshot_at_exact_index_replays_empty_tail() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    let mut wal = Wal::create(&dir, b"app=v1", small_config()).unwrap();
    wal.save(
        Some(HardState::new(1, 0)),
        &[
            Entry::new(1, 1, Bytes::from_static(b"x")),
            Entry::new(2, 1, Bytes::from_static(b"y")),
        ],
    )
    .unwrap();
    wal.save_snapshot(Snapshot::new(2, 1)).unwrap();
    wal.close().unwrap();

    let mut reopened = Wal::open(&dir, Snapshot::new(2, 1), small_config()).unwrap();
    let result = reopened.read_all().unwrap();
    assert!(result.entries.is_empty());
    assert_eq!(result.state, Some(HardState::new(1, 0)));
}

#[test]
fn s6_snapshot_term_mismatch_is_rejected() {
    let root = tempdir().unwrap();
    let dir = root.path().join("wal");
    let mut wal = Wal::create(&dir, b"app=v1", small_config()).unwrap();
    wal.save(
        Some(HardState::new(1, 0)),
        &[
            Entry::new(1, 1, Bytes::from_static(b"x")),
            Entry::new(2, 1, Bytes::from_static(b"y")),
        ],
    )
    .unwrap();
    wal.save_snapshot(Snapshot::new(2, 1)).unwrap();
    wal.close().unwrap();

    let mut reopened = Wal::open(&dir, Snapshot::new(2, 2), small_config()).unwrap();
    let err = reopened.read_all().unwrap_err();
    assert!(matches!(err, WalError::SnapshotMismatch { .. }));
}
