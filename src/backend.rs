//! Segment backend abstraction.
//!
//! Per the redesign flag in `SPEC_FULL.md` ("segment backend polymorphism"),
//! the orchestrator is agnostic to how a segment's bytes actually reach
//! durable storage. Two implementations are provided: a conventional
//! preallocated file, and a memory-mapped region standing in for a durable
//! byte-addressable pool (no real persistent-memory-pool crate exists in
//! the surrounding corpus, so `memmap2` is the closest real substitute).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use memmap2::MmapMut;

/// Uniform capability surface every segment implementation offers.
///
/// All operations act on the segment's current write cursor except
/// `open_read`, which hands back an independent forward reader starting
/// at the beginning of the file.
pub trait SegmentBackend: Send {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
    fn seek_cur(&mut self) -> io::Result<u64>;
    fn seek_set(&mut self, offset: u64) -> io::Result<()>;
    fn truncate(&mut self, offset: u64) -> io::Result<()>;
    /// Overwrites `[current cursor .. logical end]` with zeros and durably
    /// syncs, absorbing torn-write garbage left past the last valid frame.
    fn zero_to_end(&mut self) -> io::Result<()>;
    /// Best-effort physical preallocation to `size` bytes.
    fn preallocate(&mut self, size: u64) -> io::Result<()>;
    fn open_read(&self) -> io::Result<Box<dyn Read + Send>>;
    fn path(&self) -> &Path;
    fn len(&self) -> io::Result<u64>;
}

/// A plain preallocated append-only file, `fdatasync`-backed.
///
/// Segments are preallocated to their full `segment_size_bytes` up front
/// (see `new_fresh_backend`), so the physical end of file is never the
/// logical write position. `cursor` tracks that logical position
/// explicitly, the same way [`MmapBackend`] does, rather than relying on
/// `SeekFrom::End`.
pub struct FileBackend {
    file: File,
    path: PathBuf,
    cursor: u64,
}

impl FileBackend {
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            cursor: 0,
        })
    }

    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            file,
            path,
            cursor: 0,
        })
    }

    /// Acquires an exclusive advisory lock on the underlying file,
    /// non-blocking: returns `Err` immediately if another writer holds it.
    pub fn try_lock_exclusive(&self) -> io::Result<()> {
        self.file.try_lock_exclusive()
    }

    pub fn unlock(&self) -> io::Result<()> {
        self.file.unlock()
    }
}

impl SegmentBackend for FileBackend {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.cursor))?;
        self.file.write_all(data)?;
        self.cursor += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn seek_cur(&mut self) -> io::Result<u64> {
        Ok(self.cursor)
    }

    fn seek_set(&mut self, offset: u64) -> io::Result<()> {
        self.cursor = offset;
        Ok(())
    }

    fn truncate(&mut self, offset: u64) -> io::Result<()> {
        self.file.set_len(offset)?;
        self.cursor = offset;
        Ok(())
    }

    fn zero_to_end(&mut self) -> io::Result<()> {
        let cur = self.cursor;
        let len = self.file.metadata()?.len();
        if len > cur {
            self.file.set_len(cur)?;
            self.file.set_len(len)?;
        }
        self.file.sync_data()
    }

    fn preallocate(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// A memory-mapped segment standing in for a durable byte-addressable
/// pool. Appends write directly into mapped pages; `sync` degrades to a
/// cheap `flush` of the dirty range since the pool is assumed to already
/// be backed by persistent memory.
pub struct MmapBackend {
    file: File,
    path: PathBuf,
    map: MmapMut,
    cursor: usize,
    capacity: usize,
}

impl MmapBackend {
    pub fn create(path: impl Into<PathBuf>, size: u64) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.set_len(size)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            path,
            map,
            cursor: 0,
            capacity: size as usize,
        })
    }

    pub fn open(path: impl Into<PathBuf>, cursor: u64) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let capacity = file.metadata()?.len() as usize;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            path,
            map,
            cursor: cursor as usize,
            capacity,
        })
    }

    pub fn try_lock_exclusive(&self) -> io::Result<()> {
        self.file.try_lock_exclusive()
    }

    pub fn unlock(&self) -> io::Result<()> {
        self.file.unlock()
    }
}

impl SegmentBackend for MmapBackend {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        if self.cursor + data.len() > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "segment capacity exceeded",
            ));
        }
        self.map[self.cursor..self.cursor + data.len()].copy_from_slice(data);
        self.cursor += data.len();
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.map.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.map.flush()
    }

    fn seek_cur(&mut self) -> io::Result<u64> {
        Ok(self.cursor as u64)
    }

    fn seek_set(&mut self, offset: u64) -> io::Result<()> {
        if offset as usize > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek past segment capacity",
            ));
        }
        self.cursor = offset as usize;
        Ok(())
    }

    fn truncate(&mut self, offset: u64) -> io::Result<()> {
        self.seek_set(offset)?;
        self.map.flush()
    }

    fn zero_to_end(&mut self) -> io::Result<()> {
        for byte in &mut self.map[self.cursor..] {
            *byte = 0;
        }
        self.map.flush()
    }

    fn preallocate(&mut self, size: u64) -> io::Result<()> {
        if size as usize <= self.capacity {
            return Ok(());
        }
        self.map.flush()?;
        self.file.set_len(size)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = size as usize;
        Ok(())
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.capacity as u64)
    }
}
