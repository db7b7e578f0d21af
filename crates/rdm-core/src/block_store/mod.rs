//! Journaled block store.
//!
//! Splits the target file into [`BLOCK_SIZE`] blocks and records per-block
//! completion in a sidecar journal (`<target>.rdj`). The journal also carries
//! the expected length and the target's mtime at the last update; if either
//! disagrees with the file on disk, the recorded progress is not trusted.
//!
//! Block data is written and synced before its bit is set, so the journal
//! never claims bytes that are not durable.

mod error;
mod journal;
pub mod layout;
mod target;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::range::{self, ByteRange};

pub use error::StoreError;
pub use journal::{journal_path, JOURNAL_EXTENSION};
pub use layout::{BLOCK_SIZE, MAX_BLOCK_COUNT, MAX_FILE_SIZE};
pub use target::{unix_now, TargetFile};
pub(crate) use target::from_unix_secs;

use journal::Journal;

/// 0-based position of a block in the target file.
pub type BlockId = usize;

/// An open target file plus its journal.
pub struct BlockStore {
    path: PathBuf,
    target: TargetFile,
    journal: Journal,
    blocks: Vec<ByteRange>,
    length: u64,
    completed: usize,
}

impl BlockStore {
    /// Create a fresh store of `total_length` bytes with no completed blocks.
    ///
    /// Overwrites any existing target and journal. On failure the partially
    /// created files are removed.
    pub fn create(path: &Path, total_length: u64) -> Result<Self, StoreError> {
        check_length(total_length)?;
        let jpath = journal_path(path);
        let result = Self::create_files(path, &jpath, total_length);
        if result.is_err() {
            let _ = fs::remove_file(path);
            let _ = fs::remove_file(&jpath);
        }
        result
    }

    fn create_files(path: &Path, jpath: &Path, total_length: u64) -> Result<Self, StoreError> {
        let target = TargetFile::create(path)?;
        target.preallocate(total_length)?;
        let now = unix_now();
        target.set_modified_secs(now)?;

        let mut journal = Journal::create(jpath)?;
        journal.initialize(total_length, now);
        journal.flush()?;

        tracing::debug!(path = %path.display(), total_length, "created block store");
        Ok(BlockStore {
            path: path.to_path_buf(),
            target,
            journal,
            blocks: range::partition(total_length, BLOCK_SIZE),
            length: total_length,
            completed: 0,
        })
    }

    /// Open an existing store, validating the journal against the target file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let jpath = journal_path(path);
        for p in [path, jpath.as_path()] {
            if !p.exists() {
                return Err(StoreError::NotFound(p.to_path_buf()));
            }
        }
        let target = TargetFile::open(path)?;
        let journal = Journal::open(&jpath)?;

        let length = target.len()?;
        check_length(length)?;
        journal.validate(length, target.modified_secs()?)?;

        let blocks = range::partition(length, BLOCK_SIZE);
        let completed = layout::count_set(journal.record(), blocks.len());
        tracing::debug!(
            path = %path.display(),
            length,
            completed,
            blocks = blocks.len(),
            "opened block store"
        );
        Ok(BlockStore {
            path: path.to_path_buf(),
            target,
            journal,
            blocks,
            length,
            completed,
        })
    }

    /// Resize the target. A length change discards all completion state; the
    /// journal becomes valid again with the next [`save_block`](Self::save_block).
    pub fn set_length(&mut self, total_length: u64) -> Result<(), StoreError> {
        check_length(total_length)?;
        if total_length == self.length {
            return Ok(());
        }
        self.target.resize(total_length)?;
        self.journal.reset(total_length);
        self.journal.flush()?;
        self.length = total_length;
        self.blocks = range::partition(total_length, BLOCK_SIZE);
        self.completed = 0;
        tracing::info!(path = %self.path.display(), total_length, "block store resized, progress reset");
        Ok(())
    }

    /// Write block `id` and mark it complete.
    ///
    /// Saving an already complete block rewrites its data and keeps it complete.
    pub fn save_block(&mut self, id: BlockId, data: &[u8]) -> Result<(), StoreError> {
        let block = self.block_info(id).ok_or(StoreError::InvalidBlock(id))?;
        if data.len() as u64 != block.len() {
            return Err(StoreError::BlockSizeMismatch {
                id,
                expected: block.len(),
                actual: data.len() as u64,
            });
        }
        self.target.write_at(block.start, data)?;
        self.target.sync()?;
        let now = unix_now();
        self.target.set_modified_secs(now)?;

        let r = self.journal.record_mut();
        layout::set_last_modified(r, now);
        if !layout::is_block_set(r, id) {
            layout::set_block(r, id);
            self.completed += 1;
        }
        layout::restamp(r);
        self.journal.flush()?;
        Ok(())
    }

    /// Byte range of block `id`, or `None` if out of range.
    pub fn block_info(&self, id: BlockId) -> Option<ByteRange> {
        self.blocks.get(id).copied()
    }

    /// Block whose range is exactly `[offset, offset + size)`.
    pub fn block_id(&self, offset: u64, size: u64) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.start == offset && b.len() == size)
    }

    pub fn is_block_valid(&self, id: BlockId) -> bool {
        id < self.blocks.len() && layout::is_block_set(self.journal.record(), id)
    }

    /// Incomplete block ids in ascending order.
    pub fn find_invalid_blocks(&self) -> VecDeque<BlockId> {
        (0..self.blocks.len())
            .filter(|&id| !self.is_block_valid(id))
            .collect()
    }

    pub fn has_finished(&self) -> bool {
        self.completed == self.blocks.len()
    }

    /// Bytes covered by complete blocks.
    pub fn written_size(&self) -> u64 {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(id, _)| self.is_block_valid(*id))
            .map(|(_, b)| b.len())
            .sum()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the store and delete the journal; the target file stays.
    pub fn finish(self) -> Result<(), StoreError> {
        let BlockStore { path, target, journal, .. } = self;
        target.sync()?;
        drop(target);
        journal.remove()?;
        tracing::info!(path = %path.display(), "download complete, journal removed");
        Ok(())
    }

    /// Release the mapping and file handle, keeping both files on disk.
    pub fn close(self) {}
}

fn check_length(length: u64) -> Result<(), StoreError> {
    if length > MAX_FILE_SIZE {
        return Err(StoreError::TooLarge {
            length,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}
