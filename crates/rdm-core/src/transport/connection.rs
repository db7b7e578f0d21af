//! One reusable HTTP connection: a curl easy handle driven by its own multi handle.

use curl::easy::{Easy2, List};
use curl::multi::{Easy2Handle, Multi};
use std::time::Duration;

use crate::range::ByteRange;

use super::handler::TransferHandler;
use super::response::Response;
use super::sink::ResponseSink;
use super::{Method, TransportError};

/// Outcome of driving a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnResult {
    /// Transfer completed (any HTTP status).
    Ok,
    /// Still in flight.
    Again,
    /// Connect or low-speed timeout.
    Timeout,
    /// Connection closed before the announced body was complete.
    PartialDone,
    /// Any other transport failure; see [`Connection::last_error`].
    Failed,
}

enum Slot<S: ResponseSink> {
    Idle(Easy2<TransferHandler<S>>),
    Active(Easy2Handle<TransferHandler<S>>),
}

/// A connection that keeps its easy handle (and thus its socket) across requests.
///
/// Options are set while idle; [`perform_async`](Self::perform_async) attaches
/// the handle to the multi handle on first call and detaches it on completion.
pub struct Connection<S: ResponseSink> {
    multi: Multi,
    /// `None` only if the multi handle refused the easy handle.
    slot: Option<Slot<S>>,
    last_error: Option<TransportError>,
}

impl<S: ResponseSink> Connection<S> {
    pub fn new(sink: S) -> Self {
        Self {
            multi: Multi::new(),
            slot: Some(Slot::Idle(Easy2::new(TransferHandler::new(sink)))),
            last_error: None,
        }
    }

    fn idle(&mut self) -> Result<&mut Easy2<TransferHandler<S>>, TransportError> {
        match self.slot.as_mut() {
            Some(Slot::Idle(easy)) => Ok(easy),
            Some(Slot::Active(_)) => Err(TransportError::Busy),
            None => Err(TransportError::Detached),
        }
    }

    fn handler(&self) -> Option<&TransferHandler<S>> {
        match self.slot.as_ref()? {
            Slot::Idle(easy) => Some(easy.get_ref()),
            Slot::Active(handle) => Some(handle.get_ref()),
        }
    }

    fn handler_mut(&mut self) -> Option<&mut TransferHandler<S>> {
        match self.slot.as_mut()? {
            Slot::Idle(easy) => Some(easy.get_mut()),
            Slot::Active(handle) => Some(handle.get_mut()),
        }
    }

    pub fn set_url(&mut self, url: &str) -> Result<(), TransportError> {
        self.idle()?.url(url)?;
        Ok(())
    }

    pub fn set_method(&mut self, method: Method) -> Result<(), TransportError> {
        let easy = self.idle()?;
        match method {
            Method::Get => easy.get(true)?,
            Method::Head => easy.nobody(true)?,
            Method::Post => easy.post(true)?,
            Method::Put => easy.custom_request("PUT")?,
        }
        Ok(())
    }

    /// Replace the request verb while keeping GET semantics for the body.
    pub fn set_custom_method(&mut self, verb: &str) -> Result<(), TransportError> {
        self.idle()?.custom_request(verb)?;
        Ok(())
    }

    pub fn set_headers(&mut self, headers: &[(String, String)]) -> Result<(), TransportError> {
        let mut list = List::new();
        for (k, v) in headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        self.idle()?.http_headers(list)?;
        Ok(())
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.idle()?.connect_timeout(timeout)?;
        Ok(())
    }

    /// Abort when throughput stays below `bytes_per_sec` for `time`.
    pub fn set_low_speed_limit(&mut self, bytes_per_sec: u32, time: Duration) -> Result<(), TransportError> {
        let easy = self.idle()?;
        easy.low_speed_limit(bytes_per_sec)?;
        easy.low_speed_time(time)?;
        Ok(())
    }

    pub fn set_redirects(&mut self, follow: bool, max: u32) -> Result<(), TransportError> {
        let easy = self.idle()?;
        easy.follow_location(follow)?;
        easy.max_redirections(max)?;
        Ok(())
    }

    /// Restrict the body to `range`. Cleared by [`reset`](Self::reset).
    pub fn set_range(&mut self, range: &ByteRange) -> Result<(), TransportError> {
        self.idle()?.range(&range.curl_range())?;
        Ok(())
    }

    pub fn set_user_agent(&mut self, agent: &str) -> Result<(), TransportError> {
        self.idle()?.useragent(agent)?;
        Ok(())
    }

    /// Run the configured request to completion on the calling thread.
    pub fn perform(&mut self) -> ConnResult {
        self.clear_response();
        let result = match self.idle() {
            Ok(easy) => easy.perform().map_err(TransportError::from),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Drive the transfer without blocking. The first call starts it.
    pub fn perform_async(&mut self) -> ConnResult {
        if let Err(e) = self.attach() {
            return self.finish(Err(e));
        }
        if let Err(e) = self.multi.perform() {
            self.detach();
            return self.finish(Err(e.into()));
        }
        let mut done: Option<Result<(), curl::Error>> = None;
        if let Some(Slot::Active(handle)) = self.slot.as_ref() {
            self.multi.messages(|msg| {
                if let Some(result) = msg.result_for2(handle) {
                    done = Some(result);
                }
            });
        }
        match done {
            None => ConnResult::Again,
            Some(result) => {
                self.detach();
                self.finish(result.map_err(TransportError::from))
            }
        }
    }

    /// Block until there is socket activity or `ms` milliseconds pass.
    pub fn wait(&self, ms: u64) {
        if let Err(e) = self.multi.wait(&mut [], Duration::from_millis(ms)) {
            tracing::debug!(error = %e, "curl multi wait failed");
        }
    }

    /// Final (post-redirect) URL of the last completed transfer.
    pub fn effective_url(&mut self) -> Option<String> {
        let easy = self.idle().ok()?;
        easy.effective_url().ok().flatten().map(str::to_string)
    }

    pub fn response(&self) -> Option<&Response> {
        self.handler().map(|h| &h.response)
    }

    pub fn status(&self) -> u32 {
        self.response().map(|r| r.status).unwrap_or(0)
    }

    pub fn sink(&self) -> Option<&S> {
        self.handler().map(|h| &h.sink)
    }

    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.handler_mut().map(|h| &mut h.sink)
    }

    /// Body bytes received since the previous call.
    pub fn take_received(&mut self) -> u64 {
        self.handler_mut()
            .map(|h| std::mem::take(&mut h.unreported))
            .unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Abort any transfer in flight and reset all options. The sink is kept.
    pub fn reset(&mut self) {
        self.detach();
        self.last_error = None;
        self.clear_response();
        if let Some(Slot::Idle(easy)) = self.slot.as_mut() {
            easy.reset();
        }
        if let Some(h) = self.handler_mut() {
            h.unreported = 0;
        }
    }

    fn clear_response(&mut self) {
        if let Some(h) = self.handler_mut() {
            h.response.clear();
        }
    }

    fn attach(&mut self) -> Result<(), TransportError> {
        match self.slot.take() {
            Some(Slot::Idle(mut easy)) => {
                easy.get_mut().response.clear();
                match self.multi.add2(easy) {
                    Ok(handle) => {
                        self.slot = Some(Slot::Active(handle));
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Some(active @ Slot::Active(_)) => {
                self.slot = Some(active);
                Ok(())
            }
            None => Err(TransportError::Detached),
        }
    }

    fn detach(&mut self) {
        match self.slot.take() {
            Some(Slot::Active(handle)) => match self.multi.remove2(handle) {
                Ok(easy) => self.slot = Some(Slot::Idle(easy)),
                Err(e) => tracing::warn!(error = %e, "curl multi remove failed, connection dropped"),
            },
            other => self.slot = other,
        }
    }

    fn finish(&mut self, result: Result<(), TransportError>) -> ConnResult {
        match result {
            Ok(()) => {
                self.last_error = None;
                ConnResult::Ok
            }
            Err(e) => {
                let outcome = match &e {
                    TransportError::Curl(ce) if ce.is_operation_timedout() => ConnResult::Timeout,
                    TransportError::Curl(ce) if ce.is_partial_file() => ConnResult::PartialDone,
                    _ => ConnResult::Failed,
                };
                self.last_error = Some(e);
                outcome
            }
        }
    }
}
