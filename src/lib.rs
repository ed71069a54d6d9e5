//! Crash-consistent segmented write-ahead log for a replicated consensus
//! state machine.
//!
//! Segments are preallocated fixed-size files chained by CRC32C so any
//! truncation or torn write is detectable on replay. A single writer is
//! enforced with OS advisory locks; readers stream forward from a
//! snapshot and never index into the log at random.
//!
//! See [`Wal`] for the lifecycle entry points (`create`, `open`,
//! `open_for_read`, `read_all`, `save`, `save_snapshot`,
//! `release_lock_to`, `close`, `verify`).

mod backend;
mod config;
mod error;
mod lock;
mod metrics;
mod naming;
mod pipeline;
mod reader;
mod record;
mod types;
mod wal;
mod writer;

pub use backend::{FileBackend, MmapBackend, SegmentBackend};
pub use config::{SegmentBackendKind, WalConfig};
pub use error::{Result, WalError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use naming::SegmentName;
pub use record::{Record, RecordType};
pub use types::{Entry, HardState, Snapshot};
pub use wal::{ReadAllResult, Wal};
