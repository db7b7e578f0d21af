//! Blocking HEAD request for metadata that is needed before a download starts
//! (e.g. a filename from `Content-Disposition`).

use std::time::Duration;

use super::connection::{ConnResult, Connection};
use super::sink::HeadSink;
use super::{Method, TransportError};

/// Metadata returned by [`head`].
#[derive(Debug, Clone)]
pub struct HeadInfo {
    pub status: u32,
    pub content_length: Option<u64>,
    pub last_modified: Option<i64>,
    pub content_disposition: Option<String>,
    pub effective_url: Option<String>,
}

/// Performs a HEAD request on the current thread, following up to
/// `max_redirects` redirects.
pub fn head(url: &str, connect_timeout: Duration, max_redirects: u32) -> Result<HeadInfo, TransportError> {
    let mut conn = Connection::new(HeadSink);
    conn.set_url(url)?;
    conn.set_method(Method::Head)?;
    conn.set_redirects(true, max_redirects)?;
    conn.set_connect_timeout(connect_timeout)?;

    if conn.perform() != ConnResult::Ok {
        return Err(conn.last_error().cloned().unwrap_or(TransportError::Detached));
    }
    let effective_url = conn.effective_url();
    let response = conn.response().cloned().unwrap_or_default();
    Ok(HeadInfo {
        status: response.status,
        content_length: response.content_length(),
        last_modified: response.last_modified(),
        content_disposition: response.content_disposition().map(str::to_string),
        effective_url,
    })
}
