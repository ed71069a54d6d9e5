//! Per-handle configuration.
//!
//! Replaces the mutable package-level `SegmentSizeBytes` the source carried:
//! every `Wal` is constructed with an explicit [`WalConfig`] value instead.

use std::time::Duration;

/// Default preallocated size of a single segment file (64 MiB).
pub const DEFAULT_SEGMENT_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// Default threshold above which a sync is logged as slow.
pub const DEFAULT_WARN_SYNC_DURATION: Duration = Duration::from_secs(1);

/// Which [`crate::backend::SegmentBackend`] implementation new segments use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentBackendKind {
    /// Plain preallocated append-only file, durability via `fdatasync`.
    #[default]
    ClassicFile,
    /// Memory-mapped byte-addressable region standing in for a durable
    /// persistent-memory pool; `sync` degrades to a `flush`.
    DurableBytePool,
}

/// Configuration for a [`crate::wal::Wal`] handle.
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub segment_size_bytes: u64,
    pub warn_sync_duration: Duration,
    pub backend: SegmentBackendKind,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            segment_size_bytes: DEFAULT_SEGMENT_SIZE_BYTES,
            warn_sync_duration: DEFAULT_WARN_SYNC_DURATION,
            backend: SegmentBackendKind::ClassicFile,
        }
    }
}

impl WalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_segment_size(mut self, bytes: u64) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_warn_sync_duration(mut self, duration: Duration) -> Self {
        self.warn_sync_duration = duration;
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: SegmentBackendKind) -> Self {
        self.backend = backend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = WalConfig::default();
        assert_eq!(cfg.segment_size_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.warn_sync_duration, Duration::from_secs(1));
        assert_eq!(cfg.backend, SegmentBackendKind::ClassicFile);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = WalConfig::new()
            .with_segment_size(4096)
            .with_warn_sync_duration(Duration::from_millis(50))
            .with_backend(SegmentBackendKind::DurableBytePool);
        assert_eq!(cfg.segment_size_bytes, 4096);
        assert_eq!(cfg.warn_sync_duration, Duration::from_millis(50));
        assert_eq!(cfg.backend, SegmentBackendKind::DurableBytePool);
    }
}
