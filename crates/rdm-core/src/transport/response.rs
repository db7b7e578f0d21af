//! Response status and headers as seen by the transport.

use chrono::{DateTime, Utc};

use crate::range::{self, ByteRange};

/// Status line and headers of the final response (redirect hops are dropped).
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u32,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub(crate) fn clear(&mut self) {
        self.status = 0;
        self.headers.clear();
    }

    /// Value of the first header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// Range covered by this body and the complete length, if the server sent `Content-Range`.
    pub fn content_range(&self) -> Option<(ByteRange, Option<u64>)> {
        range::parse_content_range(self.header("content-range")?)
    }

    /// `Last-Modified` as unix seconds.
    pub fn last_modified(&self) -> Option<i64> {
        parse_http_date(self.header("last-modified")?)
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.header("content-disposition")
    }
}

/// Status code from a status line such as `HTTP/1.1 206 Partial Content`.
pub fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Splits `Name: value` into trimmed parts.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

/// Parses an RFC 1123 date (`Wed, 21 Oct 2015 07:28:00 GMT`) to unix seconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.timestamp())
}

/// Formats unix seconds as an RFC 1123 date for `If-Modified-Since`.
pub fn format_http_date(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|d| d.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
