//! Classify HTTP status and curl errors into retry policy error kinds.

use crate::retry::error::TransferError;
use crate::retry::policy::ErrorKind;
use crate::transport::TransportError;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Rejected,
    }
}

/// Classify a curl error. Every transport failure is worth another attempt.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_partial_file() {
        return ErrorKind::Partial;
    }
    ErrorKind::Connection
}

/// Classify a transfer error into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Transport(TransportError::Curl(ce)) => classify_curl_error(ce),
        TransferError::Transport(_) => ErrorKind::Connection,
        TransferError::Http(code) => classify_http_status(*code),
        TransferError::PartialTransfer { .. } => ErrorKind::Partial,
        TransferError::UnexpectedRange { .. } => ErrorKind::Rejected,
    }
}
