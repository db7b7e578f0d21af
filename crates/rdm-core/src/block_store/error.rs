use std::path::PathBuf;
use thiserror::Error;

use super::BlockId;

/// Errors from the journaled block store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found")]
    NotFound(PathBuf),
    #[error("file of {length} bytes exceeds the {max} byte limit")]
    TooLarge { length: u64, max: u64 },
    #[error("journal records {recorded} bytes but the file has {actual}")]
    LengthMismatch { recorded: u64, actual: u64 },
    #[error("journal has {0} bytes, expected one 4096-byte record")]
    JournalSize(u64),
    #[error("journal magic or stamp does not match")]
    JournalCorrupt,
    #[error("file was modified after the journal was last written")]
    JournalStale,
    #[error("block {0} is out of range")]
    InvalidBlock(BlockId),
    #[error("block {id} holds {expected} bytes, got {actual}")]
    BlockSizeMismatch {
        id: BlockId,
        expected: u64,
        actual: u64,
    },
}
