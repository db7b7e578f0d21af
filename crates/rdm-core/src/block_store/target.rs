//! Target file I/O: creation with preallocation, offset writes, mtime stamping.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// The file receiving downloaded blocks.
pub struct TargetFile {
    file: File,
}

impl TargetFile {
    /// Create (or truncate) the file at `path`, creating missing parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(TargetFile { file })
    }

    /// Open an existing file for resume (read+write, no truncation).
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(TargetFile { file })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real block
    /// allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            if size > 0 {
                let fd = self.file.as_raw_fd();
                let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
                if r == 0 {
                    return Ok(());
                }
                tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
            }
        }
        self.file.set_len(size)
    }

    /// Grow or shrink the file to exactly `size` bytes.
    pub fn resize(&self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    /// Write all of `data` at `offset` without moving the file cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Flush written data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Modification time in whole unix seconds.
    pub fn modified_secs(&self) -> io::Result<i64> {
        let modified = self.file.metadata()?.modified()?;
        Ok(to_unix_secs(modified))
    }

    /// Set the modification time to `secs` (whole unix seconds).
    pub fn set_modified_secs(&self, secs: i64) -> io::Result<()> {
        self.file.set_modified(from_unix_secs(secs))
    }
}

/// Current wall clock in whole unix seconds.
pub fn unix_now() -> i64 {
    to_unix_secs(SystemTime::now())
}

pub(crate) fn to_unix_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs_f64().ceil() as i64),
    }
}

pub(crate) fn from_unix_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
