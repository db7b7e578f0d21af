//! HTTP transport over libcurl.
//!
//! A [`Connection`] wraps one curl easy handle and can run a request either
//! to completion ([`Connection::perform`]) or step by step through its own
//! multi handle ([`Connection::perform_async`]). Response bytes go to a
//! [`ResponseSink`].

mod connection;
mod handler;
mod head;
mod response;
mod sink;

use thiserror::Error;

pub use connection::{ConnResult, Connection};
pub use head::{head, HeadInfo};
pub use response::{format_http_date, parse_http_date, Response};
pub use sink::{BufferSink, FileSink, HeadSink, ResponseSink};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("curl multi: {0}")]
    Multi(#[from] curl::MultiError),
    #[error("connection is busy with a transfer")]
    Busy,
    #[error("connection lost its handle")]
    Detached,
}

/// Process-wide libcurl initialization. Call once before any transfer
/// starts; later calls are no-ops.
pub fn init() {
    curl::init();
}
