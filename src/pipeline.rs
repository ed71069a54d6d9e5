//! Background segment-file producer.
//!
//! Preallocating, locking, and zeroing a fresh segment is the expensive
//! part of a `cut`. A single background worker keeps one ready-made temp
//! segment available at all times, handed off through a rendezvous
//! channel so the worker never gets more than one step ahead of the
//! consumer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::backend::{FileBackend, MmapBackend, SegmentBackend};
use crate::config::{SegmentBackendKind, WalConfig};
use crate::lock::SegmentLock;

/// A preallocated, locked, zeroed segment ready to be renamed into place
/// by `cut`.
pub struct PreparedSegment {
    pub backend: Box<dyn SegmentBackend>,
    pub lock: SegmentLock,
    pub temp_path: PathBuf,
}

/// Keeps one [`PreparedSegment`] ready via a background thread.
pub struct SegmentPipeline {
    receiver: Receiver<std::io::Result<PreparedSegment>>,
    closed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SegmentPipeline {
    pub fn spawn(dir: PathBuf, config: WalConfig) -> Self {
        let (tx, rx): (SyncSender<std::io::Result<PreparedSegment>>, _) = sync_channel(0);
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);
        let counter = Arc::new(AtomicU64::new(0));

        let worker = std::thread::Builder::new()
            .name("wal-segment-pipeline".into())
            .spawn(move || {
                while !worker_closed.load(Ordering::Relaxed) {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    let temp_path = dir.join(format!("tmp-{n:016x}.wal"));
                    let prepared = prepare_segment(&temp_path, &config);
                    let failed = prepared.is_err();
                    if tx.send(prepared).is_err() {
                        // Consumer (and channel) gone: clean up the unclaimed temp file.
                        let _ = std::fs::remove_file(&temp_path);
                        break;
                    }
                    if failed {
                        break;
                    }
                }
            })
            .expect("spawn segment pipeline worker");

        Self {
            receiver: rx,
            closed,
            worker: Some(worker),
        }
    }

    /// Blocks until the next prepared segment is ready and returns it.
    pub fn take(&self) -> std::io::Result<PreparedSegment> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "segment pipeline worker exited",
            )),
        }
    }
}

impl Drop for SegmentPipeline {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
        // Draining unblocks the worker if it's parked on `send`; it will
        // then observe `closed` and exit, or the channel disconnects and
        // it exits via the `Err` path in `spawn`.
        while self.receiver.try_recv().is_ok() {}
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Creates a fresh, zeroed, preallocated backend at `path` for the
/// configured backend kind. Shared by the pipeline worker and by `Create`,
/// which needs segment `0-0.wal` built the same way but without going
/// through the pipeline's rendezvous channel.
pub(crate) fn new_fresh_backend(
    path: &std::path::Path,
    config: &WalConfig,
) -> std::io::Result<Box<dyn SegmentBackend>> {
    let backend: Box<dyn SegmentBackend> = match config.backend {
        SegmentBackendKind::ClassicFile => {
            let mut fb = FileBackend::create(path)?;
            fb.preallocate(config.segment_size_bytes)?;
            fb.seek_set(0)?;
            fb.zero_to_end()?;
            fb.seek_set(0)?;
            Box::new(fb)
        }
        SegmentBackendKind::DurableBytePool => {
            let mut mb = MmapBackend::create(path, config.segment_size_bytes)?;
            mb.seek_set(0)?;
            Box::new(mb)
        }
    };
    Ok(backend)
}

fn prepare_segment(temp_path: &PathBuf, config: &WalConfig) -> std::io::Result<PreparedSegment> {
    let backend = new_fresh_backend(temp_path, config)?;
    let lock = SegmentLock::try_acquire(temp_path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(PreparedSegment {
        backend,
        lock,
        temp_path: temp_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn produces_a_locked_preallocated_segment() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new().with_segment_size(4096);
        let pipeline = SegmentPipeline::spawn(dir.path().to_path_buf(), config);

        let prepared = pipeline.take().unwrap();
        assert_eq!(prepared.backend.len().unwrap(), 4096);
        assert!(prepared.temp_path.exists());
    }

    #[test]
    fn drop_cleans_up_unclaimed_temp_file() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new().with_segment_size(4096);
        let pipeline = SegmentPipeline::spawn(dir.path().to_path_buf(), config);
        drop(pipeline);
        // Give the worker a beat to observe shutdown; best-effort check that
        // no stray segment files with content are left locked forever.
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}
