//! Caller-facing value types carried inside record payloads.
//!
//! `Entry` and `HardState` are modeled concretely (rather than as fully
//! opaque bytes) because the orchestrator's own `mustSync` rule and the
//! snapshot-match check both inspect their `term`/`index` fields. See the
//! "HardState modeling" entry in `DESIGN.md` for the rationale.

use bytes::Bytes;

/// A single raft log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub data: Bytes,
}

impl Entry {
    pub fn new(index: u64, term: u64, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            term,
            data: data.into(),
        }
    }

    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(16 + self.data.len());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.term.to_le_bytes());
        buf.extend_from_slice(&self.data);
        Bytes::from(buf)
    }

    pub(crate) fn decode(bytes: &Bytes) -> Option<Self> {
        if bytes.len() < 16 {
            return None;
        }
        let index = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let term = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        Some(Self {
            index,
            term,
            data: bytes.slice(16..),
        })
    }
}

/// Caller's durable replication state: current term and commit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardState {
    pub term: u64,
    pub commit: u64,
}

impl HardState {
    pub fn new(term: u64, commit: u64) -> Self {
        Self { term, commit }
    }

    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.term.to_le_bytes());
        buf.extend_from_slice(&self.commit.to_le_bytes());
        Bytes::from(buf)
    }

    pub(crate) fn decode(bytes: &Bytes) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let term = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let commit = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        Some(Self { term, commit })
    }
}

/// A pointer to an externally-stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub index: u64,
    pub term: u64,
}

impl Snapshot {
    pub fn new(index: u64, term: u64) -> Self {
        Self { index, term }
    }

    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.term.to_le_bytes());
        Bytes::from(buf)
    }

    pub(crate) fn decode(bytes: &Bytes) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let index = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let term = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        Some(Self { index, term })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrips() {
        let e = Entry::new(7, 2, Bytes::from_static(b"payload"));
        let decoded = Entry::decode(&e.encode()).unwrap();
        assert_eq!(e, decoded);
    }

    #[test]
    fn hard_state_roundtrips() {
        let s = HardState::new(5, 9);
        assert_eq!(HardState::decode(&s.encode()), Some(s));
    }

    #[test]
    fn snapshot_roundtrips() {
        let s = Snapshot::new(100, 3);
        assert_eq!(Snapshot::decode(&s.encode()), Some(s));
    }
}
