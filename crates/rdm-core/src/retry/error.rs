//! Transfer error type for retry classification.

use thiserror::Error;

use crate::transport::TransportError;

/// Why a single request (HEAD or block) failed.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Curl or the multi handle reported an error (timeout, connection, etc.).
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The response carried an HTTP status we cannot use.
    #[error("HTTP {0}")]
    Http(u32),
    /// The body is shorter or longer than the range it claims to cover.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// The response does not map to the block that was requested.
    #[error("response range {start}+{len} does not match the requested block (HTTP {status})")]
    UnexpectedRange { status: u32, start: u64, len: u64 },
}
