//! The WAL orchestrator.
//!
//! Owns the lifecycle operations described in the module docs: `create`,
//! `open`/`open_for_read`, `read_all`, `save`, `save_snapshot`, the
//! internal `cut`, `release_lock_to`, `close`, and `verify`.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::backend::{FileBackend, MmapBackend, SegmentBackend};
use crate::config::{SegmentBackendKind, WalConfig};
use crate::error::{Result, WalError};
use crate::lock::SegmentLock;
use crate::metrics::Metrics;
use crate::naming::{self, SegmentName};
use crate::pipeline::{new_fresh_backend, PreparedSegment, SegmentPipeline};
use crate::reader::{Decoded, MultiSegmentReader};
use crate::record::RecordType;
use crate::types::{Entry, HardState, Snapshot};
use crate::writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Append,
    Read,
}

/// The data replayed from a WAL directory by [`Wal::read_all`].
#[derive(Debug, Clone, Default)]
pub struct ReadAllResult {
    pub metadata: Vec<u8>,
    pub state: Option<HardState>,
    pub entries: Vec<Entry>,
}

/// A handle onto a WAL directory, in either append or read-only mode.
pub struct Wal {
    dir: PathBuf,
    dir_file: Option<File>,
    config: WalConfig,
    metrics: Arc<Metrics>,
    mode: Mode,
    locks: Vec<SegmentLock>,
    segment_names: Vec<SegmentName>,
    writer: Option<Writer>,
    decoder: Option<MultiSegmentReader>,
    pipeline: Option<SegmentPipeline>,
    metadata: Option<Vec<u8>>,
    last_hard_state: Option<HardState>,
    last_index: u64,
    start_snapshot: Snapshot,
}

impl Wal {
    /// Creates a brand new WAL directory containing exactly segment
    /// `0-0.wal`, seeded with `metadata` and a `{index:0,term:0}` snapshot
    /// marker. Fails with [`WalError::AlreadyExists`] if `dir` is already
    /// present.
    pub fn create(dir: &Path, metadata: &[u8], config: WalConfig) -> Result<Self> {
        if dir.exists() {
            return Err(WalError::AlreadyExists(dir.to_path_buf()));
        }
        let tmp_dir = tmp_dir_path(dir);
        if tmp_dir.exists() {
            std::fs::remove_dir_all(&tmp_dir)?;
        }
        std::fs::create_dir_all(&tmp_dir)?;

        match Self::create_inner(dir, &tmp_dir, metadata, &config) {
            Ok(wal) => Ok(wal),
            Err(err) => {
                let broken = broken_dir_path(dir);
                tracing::warn!(
                    dir = %dir.display(),
                    broken = %broken.display(),
                    error = %err,
                    "Create failed, quarantining tmp directory"
                );
                let _ = std::fs::rename(&tmp_dir, &broken);
                Err(err)
            }
        }
    }

    fn create_inner(
        dir: &Path,
        tmp_dir: &Path,
        metadata: &[u8],
        config: &WalConfig,
    ) -> Result<Self> {
        let seg_name = SegmentName::new(0, 0);
        let seg_path = tmp_dir.join(seg_name.file_name());
        let backend = new_fresh_backend(&seg_path, config)?;
        let lock = SegmentLock::try_acquire(&seg_path)?;

        let mut writer = Writer::new(backend, 0);
        writer.encode(RecordType::Crc, Bytes::new())?;
        writer.encode(RecordType::Metadata, Bytes::copy_from_slice(metadata))?;
        writer.encode(RecordType::Snapshot, Snapshot::default().encode())?;
        writer.sync()?;

        let metrics = Arc::new(Metrics::new());

        if let Err(e) = std::fs::rename(tmp_dir, dir) {
            tracing::warn!(error = %e, "directory rename failed while locks are held, retrying via lock-drop fallback");
            drop(lock);
            drop(writer);
            std::fs::rename(tmp_dir, dir)?;
            metrics.increment_rename_fallbacks();
            let mut wal = Self::open_internal(dir, Snapshot::default(), config.clone(), Mode::Append)?;
            wal.read_all()?;
            return Ok(wal);
        }

        let dir_file = File::open(dir)?;
        dir_file.sync_all()?;

        let pipeline = SegmentPipeline::spawn(dir.to_path_buf(), config.clone());

        Ok(Self {
            dir: dir.to_path_buf(),
            dir_file: Some(dir_file),
            config: config.clone(),
            metrics,
            mode: Mode::Append,
            locks: vec![lock],
            segment_names: vec![seg_name],
            writer: Some(writer),
            decoder: None,
            pipeline: Some(pipeline),
            metadata: Some(metadata.to_vec()),
            last_hard_state: None,
            last_index: 0,
            start_snapshot: Snapshot::default(),
        })
    }

    /// Opens the segment set covering `snapshot` in append mode, acquiring
    /// a lock on every segment. Returns [`WalError::LockContended`] if
    /// another writer already holds one.
    pub fn open(dir: &Path, snapshot: Snapshot, config: WalConfig) -> Result<Self> {
        Self::open_internal(dir, snapshot, config, Mode::Append)
    }

    /// Opens the segment set covering `snapshot` in read-only mode; no
    /// locks are taken, and a racing writer's in-progress tail is
    /// tolerated rather than treated as corruption.
    pub fn open_for_read(dir: &Path, snapshot: Snapshot, config: WalConfig) -> Result<Self> {
        Self::open_internal(dir, snapshot, config, Mode::Read)
    }

    fn open_internal(dir: &Path, snapshot: Snapshot, config: WalConfig, mode: Mode) -> Result<Self> {
        let names = naming::list_segments(dir)?;
        let start_idx = naming::search_index(&names, snapshot.index)
            .ok_or(WalError::FileNotFound(snapshot.index))?;
        let candidates = &names[start_idx..];
        if !naming::is_valid_seq(candidates) {
            return Err(WalError::FileNotFound(snapshot.index));
        }

        let mut locks = Vec::new();
        let mut segment_readers = Vec::new();
        for name in candidates {
            let path = dir.join(name.file_name());
            if mode == Mode::Append {
                locks.push(SegmentLock::try_acquire(&path)?);
            }
            let reader: Box<dyn io::Read + Send> = Box::new(File::open(&path)?);
            segment_readers.push((path, reader));
        }

        let decoder = MultiSegmentReader::new(segment_readers);
        let dir_file = if mode == Mode::Append {
            Some(File::open(dir)?)
        } else {
            None
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            dir_file,
            config,
            metrics: Arc::new(Metrics::new()),
            mode,
            locks,
            segment_names: candidates.to_vec(),
            writer: None,
            decoder: Some(decoder),
            pipeline: None,
            metadata: None,
            last_hard_state: None,
            last_index: 0,
            start_snapshot: snapshot,
        })
    }

    /// Streams every record in the open segment set, validating the CRC
    /// chain and metadata consistency, and returns the replayed metadata,
    /// hard state, and entry slice. In append mode, transitions the handle
    /// to writable: any torn tail is zeroed and a fresh [`Writer`] is
    /// seeded with the final running CRC.
    pub fn read_all(&mut self) -> Result<ReadAllResult> {
        let mut decoder = self
            .decoder
            .take()
            .ok_or(WalError::WrongMode("a handle with an active decoder"))?;

        let mut metadata: Option<Vec<u8>> = None;
        let mut state: Option<HardState> = None;
        let mut entries: Vec<Entry> = Vec::new();
        let mut saw_matching_snapshot = false;
        let mut torn = false;

        loop {
            match decoder.read_one() {
                Ok(Decoded::Eof) => break,
                Ok(Decoded::Record(record)) => match record.record_type {
                    RecordType::Crc => {}
                    RecordType::Metadata => {
                        let bytes = record.data.to_vec();
                        match &metadata {
                            Some(existing) if existing != &bytes => {
                                return Err(WalError::MetadataConflict {
                                    expected: existing.clone(),
                                    found: bytes,
                                });
                            }
                            _ => metadata = Some(bytes),
                        }
                    }
                    RecordType::State => {
                        state = HardState::decode(&record.data);
                    }
                    RecordType::Snapshot => {
                        if let Some(snap) = Snapshot::decode(&record.data) {
                            if snap.index == self.start_snapshot.index {
                                if snap.term != self.start_snapshot.term {
                                    return Err(WalError::SnapshotMismatch {
                                        index: snap.index,
                                        requested_term: self.start_snapshot.term,
                                        found_term: snap.term,
                                    });
                                }
                                saw_matching_snapshot = true;
                            }
                        }
                    }
                    RecordType::Entry => {
                        if let Some(entry) = Entry::decode(&record.data) {
                            self.last_index = self.last_index.max(entry.index);
                            if entry.index > self.start_snapshot.index {
                                entries.retain(|e: &Entry| e.index < entry.index);
                                entries.push(entry);
                            }
                        }
                    }
                },
                Err(WalError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    torn = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if !saw_matching_snapshot {
            return Err(WalError::SnapshotNotFound(self.start_snapshot.index));
        }

        self.metadata = metadata.clone();
        self.last_hard_state = state;

        if self.mode == Mode::Append {
            let last_offset = decoder.last_offset();
            let last_crc = decoder.last_crc();
            drop(decoder);

            let last_name = *self
                .segment_names
                .last()
                .expect("append-mode handle always has at least one segment");
            let path = self.dir.join(last_name.file_name());
            let mut backend = reopen_backend_for_write(&path, &self.config)?;
            backend.seek_set(last_offset)?;
            backend.zero_to_end()?;
            if torn {
                tracing::warn!(
                    segment = %path.display(),
                    offset = last_offset,
                    "torn tail detected on recovery, zeroed to end of segment"
                );
            }
            self.writer = Some(Writer::new(backend, last_crc));
            self.pipeline = Some(SegmentPipeline::spawn(self.dir.clone(), self.config.clone()));
        }

        Ok(ReadAllResult {
            metadata: metadata.unwrap_or_default(),
            state,
            entries,
        })
    }

    /// Appends `entries` and, if present, a new hard-state record.
    /// Durably syncs whenever a hard state is supplied; bare entry appends
    /// may be lost on crash before the next syncing `save`, matching raft's
    /// documented durability contract.
    pub fn save(&mut self, state: Option<HardState>, entries: &[Entry]) -> Result<()> {
        if state.is_none() && entries.is_empty() {
            return Ok(());
        }
        let must_sync = state.is_some();

        for entry in entries {
            let encoded = entry.encode();
            self.writer_mut()?.encode(RecordType::Entry, encoded)?;
            self.last_index = self.last_index.max(entry.index);
        }
        if let Some(state) = state {
            self.writer_mut()?.encode(RecordType::State, state.encode())?;
            self.last_hard_state = Some(state);
        }

        let offset = self.writer_mut()?.offset()?;
        if offset < self.config.segment_size_bytes {
            if must_sync {
                self.sync_writer()?;
            }
            return Ok(());
        }
        self.cut()
    }

    /// Records a snapshot pointer. Always durable on return; does not
    /// itself trigger a segment cut.
    pub fn save_snapshot(&mut self, snap: Snapshot) -> Result<()> {
        let encoded = snap.encode();
        self.writer_mut()?.encode(RecordType::Snapshot, encoded)?;
        self.sync_writer()?;
        self.last_index = self.last_index.max(snap.index);
        Ok(())
    }

    /// Closes the current segment and opens the next one, handing off a
    /// preallocated temp segment from the background pipeline.
    fn cut(&mut self) -> Result<()> {
        let old_writer = self.writer.take().ok_or(WalError::WrongMode("append"))?;
        let outgoing_crc = old_writer.crc_sum();
        let mut old_backend = old_writer.into_backend();
        let offset = old_backend.seek_cur()?;
        old_backend.truncate(offset)?;
        old_backend.sync()?;
        drop(old_backend);

        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or(WalError::WrongMode("append"))?;
        let prepared = match pipeline.take() {
            Ok(p) => p,
            Err(e) => {
                self.metrics.increment_preallocate_failures();
                return Err(e.into());
            }
        };
        let PreparedSegment {
            backend: new_backend,
            lock: new_lock,
            temp_path,
        } = prepared;

        let mut writer = Writer::new(new_backend, outgoing_crc);
        writer.encode(RecordType::Crc, Bytes::new())?;
        if let Some(meta) = self.metadata.clone() {
            writer.encode(RecordType::Metadata, Bytes::from(meta))?;
        }
        if let Some(state) = self.last_hard_state {
            writer.encode(RecordType::State, state.encode())?;
        }
        writer.sync()?;
        let header_end = writer.offset()?;
        let running_crc = writer.crc_sum();
        drop(writer);
        drop(new_lock);

        let new_seq = self
            .segment_names
            .last()
            .expect("append-mode handle always has at least one segment")
            .seq
            + 1;
        let new_name = SegmentName::new(new_seq, self.last_index + 1);
        let final_path = self.dir.join(new_name.file_name());

        std::fs::rename(&temp_path, &final_path)?;
        if let Some(dir_file) = &self.dir_file {
            dir_file.sync_all()?;
        }

        let mut reopened = reopen_backend_for_write(&final_path, &self.config)?;
        reopened.seek_set(header_end)?;
        let relocked = SegmentLock::try_acquire(&final_path)?;

        self.locks.push(relocked);
        self.segment_names.push(new_name);
        self.writer = Some(Writer::new(reopened, running_crc));
        self.metrics.increment_segment_cuts();
        tracing::info!(segment = %final_path.display(), "cut to new segment");
        Ok(())
    }

    /// Unlocks every segment whose `first_index < index`, preserving the
    /// largest one that still covers positions before `index`. Files stay
    /// on disk; deletion is the caller's concern.
    pub fn release_lock_to(&mut self, index: u64) -> Result<()> {
        let mut keep_from = 0;
        for (i, name) in self.segment_names.iter().enumerate() {
            if name.first_index < index {
                keep_from = i;
            }
        }
        if keep_from == 0 {
            return Ok(());
        }
        let released: Vec<SegmentLock> = self.locks.drain(0..keep_from).collect();
        self.segment_names.drain(0..keep_from);
        for lock in released {
            let path = lock.path().to_path_buf();
            lock.release()?;
            tracing::debug!(segment = %path.display(), "released lock below retained snapshot index");
        }
        Ok(())
    }

    /// Syncs the tail (if writable) and releases every held lock.
    pub fn close(mut self) -> Result<()> {
        if self.mode == Mode::Append {
            if let Some(writer) = self.writer.as_mut() {
                if let Err(e) = writer.sync() {
                    tracing::error!(error = %e, "failed to flush WAL segment on close");
                    return Err(e);
                }
            }
        }
        self.pipeline = None;
        for lock in self.locks.drain(..) {
            let _ = lock.release();
        }
        Ok(())
    }

    /// Validates the CRC chain and metadata consistency of the segment set
    /// covering `snapshot` without mutating anything, for read-only
    /// integrity checks while another process may hold the writer.
    pub fn verify(dir: &Path, snapshot: Snapshot, config: WalConfig) -> Result<()> {
        let mut wal = Self::open_for_read(dir, snapshot, config)?;
        wal.read_all()?;
        Ok(())
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn writer_mut(&mut self) -> Result<&mut Writer> {
        self.writer.as_mut().ok_or(WalError::WrongMode("append"))
    }

    fn sync_writer(&mut self) -> Result<()> {
        let duration = self.writer_mut()?.sync()?;
        self.metrics
            .record_sync(duration, self.config.warn_sync_duration);
        if duration > self.config.warn_sync_duration {
            tracing::warn!(duration = ?duration, "slow WAL sync");
        }
        Ok(())
    }
}

fn reopen_backend_for_write(path: &Path, config: &WalConfig) -> Result<Box<dyn SegmentBackend>> {
    let backend: Box<dyn SegmentBackend> = match config.backend {
        SegmentBackendKind::ClassicFile => Box::new(FileBackend::open(path)?),
        SegmentBackendKind::DurableBytePool => Box::new(MmapBackend::open(path, 0)?),
    };
    Ok(backend)
}

fn tmp_dir_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn broken_dir_path(dir: &Path) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut name = dir.as_os_str().to_owned();
    name.push(format!(".broken.{ts}"));
    PathBuf::from(name)
}
