//! Framed append with a running CRC, buffered over a segment backend.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::backend::SegmentBackend;
use crate::error::Result;
use crate::record::{chain_crc, Record, RecordType};

/// Encodes records onto a segment backend, maintaining the running CRC
/// that chains across the whole WAL.
pub struct Writer {
    backend: Box<dyn SegmentBackend>,
    running_crc: u32,
}

impl Writer {
    pub fn new(backend: Box<dyn SegmentBackend>, running_crc: u32) -> Self {
        Self {
            backend,
            running_crc,
        }
    }

    /// Encodes and appends one record. A [`RecordType::Crc`] record's `crc`
    /// field carries the running value verbatim rather than a chained
    /// checksum of (empty) data.
    pub fn encode(&mut self, record_type: RecordType, data: Bytes) -> Result<usize> {
        let crc = if matches!(record_type, RecordType::Crc) {
            self.running_crc
        } else {
            chain_crc(self.running_crc, &data)
        };
        let record = Record::new(record_type, crc, data);
        let mut framed = Vec::new();
        let n = record.write_into(&mut framed)?;
        self.backend.append(&framed)?;
        self.running_crc = crc;
        Ok(n)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Durably syncs the backend, returning how long it took so the caller
    /// can compare against `warn_sync_duration` and record it.
    pub fn sync(&mut self) -> Result<Duration> {
        let start = Instant::now();
        self.backend.sync()?;
        Ok(start.elapsed())
    }

    pub fn crc_sum(&self) -> u32 {
        self.running_crc
    }

    pub fn offset(&mut self) -> Result<u64> {
        Ok(self.backend.seek_cur()?)
    }

    pub fn truncate(&mut self, offset: u64) -> Result<()> {
        self.backend.truncate(offset)?;
        Ok(())
    }

    pub fn backend(&self) -> &dyn SegmentBackend {
        self.backend.as_ref()
    }

    pub fn into_backend(self) -> Box<dyn SegmentBackend> {
        self.backend
    }
}
