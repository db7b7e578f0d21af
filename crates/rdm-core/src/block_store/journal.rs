//! Memory-mapped journal file.

use memmap2::MmapMut;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::layout;

/// Extension appended to the target path to name its journal.
pub const JOURNAL_EXTENSION: &str = ".rdj";

/// Path of the journal for `target`: `file.iso` → `file.iso.rdj`.
pub fn journal_path(target: &Path) -> PathBuf {
    let mut o = target.as_os_str().to_owned();
    o.push(JOURNAL_EXTENSION);
    PathBuf::from(o)
}

pub(super) struct Journal {
    map: MmapMut,
    path: PathBuf,
}

impl Journal {
    /// Create (or truncate) the journal and map a zeroed record.
    pub(super) fn create(path: &Path) -> Result<Self, StoreError> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(layout::RECORD_SIZE as u64)?;
        Self::map(file, path)
    }

    /// Map an existing journal. The file must be exactly one record long.
    pub(super) fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::options().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len != layout::RECORD_SIZE as u64 {
            return Err(StoreError::JournalSize(len));
        }
        Self::map(file, path)
    }

    fn map(file: File, path: &Path) -> Result<Self, StoreError> {
        // The journal is owned by a single store; nothing else truncates it while mapped.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Journal {
            map,
            path: path.to_path_buf(),
        })
    }

    pub(super) fn record(&self) -> &[u8] {
        &self.map[..]
    }

    pub(super) fn record_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }

    /// Write magic, length and modification time over a cleared bitmap and stamp.
    pub(super) fn initialize(&mut self, length: u64, modified: i64) {
        let r = self.record_mut();
        r.fill(0);
        layout::set_magic(r);
        layout::set_total_length(r, length);
        layout::set_last_modified(r, modified);
        layout::restamp(r);
    }

    /// Forget all completion state for a new length. Stamp and mtime are left
    /// for the next block write, so the journal does not validate until then.
    pub(super) fn reset(&mut self, length: u64) {
        let r = self.record_mut();
        layout::set_magic(r);
        layout::set_total_length(r, length);
        layout::clear_bitmap(r);
    }

    /// Check the record against the target file it describes.
    pub(super) fn validate(&self, actual_length: u64, actual_modified: i64) -> Result<(), StoreError> {
        let r = self.record();
        if !layout::is_intact(r) {
            return Err(StoreError::JournalCorrupt);
        }
        let recorded = layout::total_length(r);
        if recorded != actual_length {
            return Err(StoreError::LengthMismatch {
                recorded,
                actual: actual_length,
            });
        }
        if layout::last_modified(r) != actual_modified {
            return Err(StoreError::JournalStale);
        }
        Ok(())
    }

    pub(super) fn flush(&self) -> Result<(), StoreError> {
        self.map.flush()?;
        Ok(())
    }

    /// Unmap and delete the journal file.
    pub(super) fn remove(self) -> Result<(), StoreError> {
        let Journal { map, path } = self;
        drop(map);
        fs::remove_file(&path)?;
        Ok(())
    }
}
