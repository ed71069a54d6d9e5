//! Advisory file locking for single-writer enforcement.
//!
//! A [`SegmentLock`] is a dedicated file descriptor opened purely to hold
//! an OS advisory lock on a segment, independent of whatever
//! [`crate::backend::SegmentBackend`] is doing I/O through its own
//! descriptor. Keeping locking orthogonal to the backend lets the
//! orchestrator track "every segment currently held" (invariant 4) the
//! same way regardless of backend kind.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, WalError};

pub struct SegmentLock {
    file: File,
    path: PathBuf,
}

impl SegmentLock {
    /// Attempts to acquire an exclusive, non-blocking lock on `path`.
    /// Returns [`WalError::LockContended`] if another handle already holds
    /// it.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if is_lock_contended(&e) => Err(WalError::LockContended(path)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock explicitly. Equivalent to dropping the value, but
    /// named for call sites like `ReleaseLockTo` where the intent should
    /// read clearly.
    pub fn release(self) -> io::Result<()> {
        self.file.unlock()
    }
}

fn is_lock_contended(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Other
    ) || err.raw_os_error() == Some(libc_ewouldblock())
}

/// `EWOULDBLOCK`/`EAGAIN` on the common unix targets; used as a fallback
/// for platforms where `fs2` surfaces the contention as a raw OS error
/// rather than `io::ErrorKind::WouldBlock`.
fn libc_ewouldblock() -> i32 {
    11
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as StdFile;
    use tempfile::tempdir;

    #[test]
    fn second_lock_on_same_file_is_contended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.wal");
        StdFile::create(&path).unwrap();

        let first = SegmentLock::try_acquire(&path).unwrap();
        let second = SegmentLock::try_acquire(&path);
        assert!(matches!(second, Err(WalError::LockContended(_))));

        first.release().unwrap();
        assert!(SegmentLock::try_acquire(&path).is_ok());
    }
}
