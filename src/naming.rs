//! Segment filename parsing, ordering, and selection.
//!
//! Names are `<seq>-<firstIndex>.wal`, each field 16 lowercase hex digits.
//! These are pure functions over the filename set; no I/O happens here.

use std::path::Path;

/// Parsed `(seq, first_index)` pair from a segment filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentName {
    pub seq: u64,
    pub first_index: u64,
}

impl SegmentName {
    pub fn new(seq: u64, first_index: u64) -> Self {
        Self { seq, first_index }
    }

    /// Formats the canonical on-disk filename for this segment.
    pub fn file_name(self) -> String {
        format!("{:016x}-{:016x}.wal", self.seq, self.first_index)
    }

    /// Parses a segment filename, returning `None` for anything that does
    /// not match the exact `<16 hex>-<16 hex>.wal` shape (including files
    /// left behind by a crashed `cut`, e.g. temp segments).
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".wal")?;
        let (seq_str, idx_str) = stem.split_once('-')?;
        if seq_str.len() != 16 || idx_str.len() != 16 {
            return None;
        }
        let seq = u64::from_str_radix(seq_str, 16).ok()?;
        let first_index = u64::from_str_radix(idx_str, 16).ok()?;
        Some(Self { seq, first_index })
    }

    pub fn parse_path(path: &Path) -> Option<Self> {
        Self::parse(path.file_name()?.to_str()?)
    }
}

/// Reads and parses every valid segment filename from `dir`, sorted by
/// `(seq, first_index)`. Unrecognized entries (temp files, `.tmp`
/// directories, stray data) are silently skipped, matching the source's
/// tolerance for leftovers from a crashed `cut`.
pub fn list_segments(dir: &Path) -> std::io::Result<Vec<SegmentName>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str().and_then(SegmentName::parse) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Returns the index of the last segment in `names` whose `first_index`
/// is `<= snap_index`, i.e. the first segment of the set a reader should
/// open to replay from `snap_index`. `names` must already be sorted.
pub fn search_index(names: &[SegmentName], snap_index: u64) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    match names.partition_point(|n| n.first_index <= snap_index) {
        0 => None,
        n => Some(n - 1),
    }
}

/// Verifies that `names` (a suffix of the full segment list, as returned
/// by [`search_index`]) has strictly increasing `seq` values, i.e. forms
/// an unbroken chain with no gaps left by a partially-completed `cut`.
pub fn is_valid_seq(names: &[SegmentName]) -> bool {
    names.windows(2).all(|pair| pair[1].seq == pair[0].seq + 1)
}
