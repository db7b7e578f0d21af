//! Conditional refresh of a locally cached file.
//!
//! Sends `If-Modified-Since` with the local file's mtime. On `304` the file
//! is left alone; on `200` the new body, stamped with the server's
//! `Last-Modified`, is renamed over it. Any other outcome leaves the local
//! copy as it was.

use std::path::Path;
use std::time::Duration;

use crate::block_store::{from_unix_secs, unix_now, StoreError, TargetFile};
use crate::channel::ChannelError;
use crate::control::ProgressObserver;
use crate::downloader::FetchError;
use crate::retry::TransferError;
use crate::transport::{format_http_date, ConnResult, Connection, FileSink, Method, TransportError};

/// Low-speed abort for cache refreshes: below 128 B/s for 32 s.
const LOW_SPEED_LIMIT: u32 = 128;
const LOW_SPEED_TIME: Duration = Duration::from_secs(32);
const MAX_REDIRECTS: u32 = 5;
const WAIT_MS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server sent a new body; the file was replaced.
    Updated,
    /// The local copy is current.
    NotModified,
}

/// Bring `path` up to date with `url`.
pub fn sync(url: &str, path: &Path, observer: Option<&mut dyn ProgressObserver>) -> Result<SyncOutcome, FetchError> {
    if url.is_empty() || path.as_os_str().is_empty() {
        return Err(FetchError::InvalidConfig("url and path are required".into()));
    }
    let since = local_mtime(path);
    let sink = FileSink::create(path).map_err(|e| FetchError::OpenFileFailed(StoreError::Io(e)))?;
    let mut conn = Connection::new(sink);
    configure(&mut conn, url, since).map_err(|e| FetchError::Channel(ChannelError::Setup(e)))?;

    let mut observer = observer;
    loop {
        let result = conn.perform_async();
        if let Some(obs) = observer.as_deref_mut() {
            obs.on_input(conn.take_received());
            let written = conn.sink().map(FileSink::written).unwrap_or(0);
            let total = conn.response().and_then(|r| r.content_length()).unwrap_or(0);
            if !obs.on_progress(written, total) {
                tracing::info!(url, "cache sync aborted by user");
                return Err(FetchError::UserAbort);
            }
        }
        match result {
            ConnResult::Again => conn.wait(WAIT_MS),
            ConnResult::Ok => break,
            ConnResult::Timeout | ConnResult::PartialDone | ConnResult::Failed => {
                if let Some(e) = conn.sink_mut().and_then(FileSink::take_error) {
                    return Err(FetchError::SaveBlockFailed(StoreError::Io(e)));
                }
                let err = conn.last_error().cloned().unwrap_or(TransportError::Detached);
                tracing::warn!(url, error = %err, "cache sync transfer failed");
                // A refresh is a single attempt; the caller decides whether to retry.
                return Err(FetchError::RetriesExhausted {
                    attempts: 1,
                    last: TransferError::Transport(err),
                });
            }
        }
    }

    let status = conn.status();
    match status {
        304 => {
            tracing::debug!(url, path = %path.display(), "cache is current");
            Ok(SyncOutcome::NotModified)
        }
        200 => {
            let modified = conn
                .response()
                .and_then(|r| r.last_modified())
                .unwrap_or_else(unix_now);
            let Some(sink) = conn.sink_mut() else {
                return Err(FetchError::Failed { status });
            };
            sink.commit(from_unix_secs(modified))
                .map_err(|e| FetchError::SaveBlockFailed(StoreError::Io(e)))?;
            tracing::info!(url, path = %path.display(), bytes = sink.written(), "cache updated");
            Ok(SyncOutcome::Updated)
        }
        _ => Err(FetchError::Failed { status }),
    }
}

fn configure(conn: &mut Connection<FileSink>, url: &str, since: Option<i64>) -> Result<(), TransportError> {
    conn.set_url(url)?;
    conn.set_method(Method::Get)?;
    conn.set_low_speed_limit(LOW_SPEED_LIMIT, LOW_SPEED_TIME)?;
    conn.set_redirects(true, MAX_REDIRECTS)?;
    let mut headers = vec![("Connection".to_string(), "Keep-Alive".to_string())];
    if let Some(date) = since.and_then(format_http_date) {
        headers.push(("If-Modified-Since".to_string(), date));
    }
    conn.set_headers(&headers)
}

/// Mtime of an existing, non-empty local copy.
fn local_mtime(path: &Path) -> Option<i64> {
    let target = TargetFile::open(path).ok()?;
    if target.len().ok()? == 0 {
        return None;
    }
    target.modified_secs().ok()
}
