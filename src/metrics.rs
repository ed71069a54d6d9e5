//! Lightweight atomic metrics for a WAL handle.
//!
//! Const-constructible, lock-free, no external metrics crate pulled in —
//! sized down to what this crate actually needs to observe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bucket upper bounds, in milliseconds, for the sync-duration histogram.
const SYNC_BUCKET_BOUNDS_MS: [f64; 7] = [1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

/// Per-handle metrics. Cheap to construct; safe to share across the
/// background segment-file pipeline and the orchestrator via a shared
/// reference.
#[derive(Debug)]
pub struct Metrics {
    sync_latency_buckets: [AtomicU64; 7],
    sync_latency_sum_ns: AtomicU64,
    sync_latency_count: AtomicU64,
    slow_sync_total: AtomicU64,

    segment_cuts_total: AtomicU64,
    preallocate_failures_total: AtomicU64,
    rename_fallbacks_total: AtomicU64,
    bytes_appended_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sync_latency_buckets: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            sync_latency_sum_ns: AtomicU64::new(0),
            sync_latency_count: AtomicU64::new(0),
            slow_sync_total: AtomicU64::new(0),
            segment_cuts_total: AtomicU64::new(0),
            preallocate_failures_total: AtomicU64::new(0),
            rename_fallbacks_total: AtomicU64::new(0),
            bytes_appended_total: AtomicU64::new(0),
        }
    }

    /// Records a completed `sync()` duration, incrementing `slow_sync_total`
    /// when it exceeds `warn_threshold`. Callers are expected to also emit a
    /// `tracing::warn!` at the call site; this just keeps the count.
    pub fn record_sync(&self, duration: Duration, warn_threshold: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        for (i, &bound) in SYNC_BUCKET_BOUNDS_MS.iter().enumerate() {
            if ms <= bound {
                self.sync_latency_buckets[i].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
        self.sync_latency_sum_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.sync_latency_count.fetch_add(1, Ordering::Relaxed);
        if duration > warn_threshold {
            self.slow_sync_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_segment_cuts(&self) {
        self.segment_cuts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_preallocate_failures(&self) {
        self.preallocate_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rename_fallbacks(&self) {
        self.rename_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_appended(&self, bytes: u64) {
        self.bytes_appended_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sync_latency_count: self.sync_latency_count.load(Ordering::Relaxed),
            slow_sync_total: self.slow_sync_total.load(Ordering::Relaxed),
            segment_cuts_total: self.segment_cuts_total.load(Ordering::Relaxed),
            preallocate_failures_total: self.preallocate_failures_total.load(Ordering::Relaxed),
            rename_fallbacks_total: self.rename_fallbacks_total.load(Ordering::Relaxed),
            bytes_appended_total: self.bytes_appended_total.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`Metrics`], for tests and embedding exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub sync_latency_count: u64,
    pub slow_sync_total: u64,
    pub segment_cuts_total: u64,
    pub preallocate_failures_total: u64,
    pub rename_fallbacks_total: u64,
    pub bytes_appended_total: u64,
}
