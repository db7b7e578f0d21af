//! Easy2 handler that splits curl callbacks into a [`ResponseSink`].

use std::str;

use super::response::{parse_header_line, parse_status_line, Response};
use super::sink::ResponseSink;

pub(super) struct TransferHandler<S> {
    pub(super) sink: S,
    pub(super) response: Response,
    /// Body bytes received since the last `take_received`.
    pub(super) unreported: u64,
}

impl<S: ResponseSink> TransferHandler<S> {
    pub(super) fn new(sink: S) -> Self {
        Self {
            sink,
            response: Response::default(),
            unreported: 0,
        }
    }
}

impl<S: ResponseSink> curl::easy::Handler for TransferHandler<S> {
    fn header(&mut self, data: &[u8]) -> bool {
        let Ok(line) = str::from_utf8(data) else {
            return true;
        };
        let line = line.trim_end();
        if line.starts_with("HTTP/") {
            self.response.clear();
            self.response.status = parse_status_line(line).unwrap_or(0);
            self.sink.on_status(self.response.status);
        } else if let Some((name, value)) = parse_header_line(line) {
            self.response
                .headers
                .push((name.to_string(), value.to_string()));
            self.sink.on_header(name, value);
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
        if !self.sink.on_body_chunk(data) {
            return Ok(0);
        }
        self.unreported += data.len() as u64;
        Ok(data.len())
    }
}
