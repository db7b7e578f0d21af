//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures, rejected
//! requests) and exponential backoff decisions shared by the HEAD request and the
//! block transfers.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
