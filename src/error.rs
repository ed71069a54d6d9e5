//! Error types for the write-ahead log.

use std::path::PathBuf;
use thiserror::Error;

/// WAL errors.
#[derive(Error, Debug)]
pub enum WalError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `Create` was called on a directory that already holds a WAL.
    #[error("WAL already exists at {0}")]
    AlreadyExists(PathBuf),

    /// Replayed metadata does not match a previously observed value.
    #[error("metadata conflict: expected {expected:?}, found {found:?}")]
    MetadataConflict { expected: Vec<u8>, found: Vec<u8> },

    /// No segment set covers the requested snapshot index.
    #[error("no segment covers snapshot index {0}")]
    FileNotFound(u64),

    /// A record's checksum did not match its payload.
    #[error("crc mismatch in segment {segment}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        segment: PathBuf,
        expected: u32,
        actual: u32,
    },

    /// The leading snapshot record of a segment set did not match the
    /// requested snapshot position.
    #[error("snapshot mismatch: requested term {requested_term} at index {index}, found term {found_term}")]
    SnapshotMismatch {
        index: u64,
        requested_term: u64,
        found_term: u64,
    },

    /// Replay completed without ever observing a snapshot record at the
    /// requested index.
    #[error("no snapshot record found at index {0}")]
    SnapshotNotFound(u64),

    /// Another handle already holds the writer lock on this directory.
    #[error("segment {0} is locked by another writer")]
    LockContended(PathBuf),

    /// A record frame was truncated, malformed, or carried an unknown type.
    #[error("malformed record in segment {segment}: {reason}")]
    Corrupt { segment: PathBuf, reason: String },

    /// The handle is not in the mode (`read` vs. append) required by the
    /// requested operation.
    #[error("operation requires {0} mode")]
    WrongMode(&'static str),
}

/// Result type for WAL operations.
pub type Result<T> = std::result::Result<T, WalError>;
