use thiserror::Error;

use crate::block_store::StoreError;
use crate::channel::ChannelError;
use crate::retry::TransferError;

/// Terminal outcome of a fetch other than success.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid download configuration: {0}")]
    InvalidConfig(String),
    #[error("server answered with HTTP {status}")]
    Failed { status: u32 },
    #[error("server did not report the file size")]
    FileSizeUnknown,
    #[error("file size mismatch: expected {expected} bytes, server reports {actual}")]
    FileSizeMismatch { expected: u64, actual: u64 },
    #[error("cannot open target file: {0}")]
    OpenFileFailed(#[source] StoreError),
    #[error("cannot save block: {0}")]
    SaveBlockFailed(#[source] StoreError),
    #[error("giving up after {attempts} failed attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: TransferError,
    },
    #[error("request rejected: {0}")]
    Rejected(#[source] TransferError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("aborted by user")]
    UserAbort,
}
