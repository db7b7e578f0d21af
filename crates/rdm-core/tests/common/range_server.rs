//! Minimal HTTP/1.1 server with HEAD, Range GET and conditional GET support.
//!
//! Serves one static body at every path except the redirect entry point.
//! Each connection handles a single request and is then closed.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rdm_core::transport::{format_http_date, parse_http_date};

/// Path that answers `302` to [`DATA_PATH`] when redirects are enabled.
pub const REDIRECT_PATH: &str = "/start";
pub const DATA_PATH: &str = "/data";

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Omit Content-Length on HEAD.
    pub hide_length: bool,
    /// Close this many HEAD connections without answering.
    pub drop_first_heads: usize,
    /// Answer this many GETs with `503` before serving data.
    pub fail_first_gets: usize,
    /// Answer every GET with `403`.
    pub reject_gets: bool,
    /// `Last-Modified` in unix seconds; enables `304` for conditional GETs.
    pub last_modified: Option<i64>,
    /// Serve a redirect at [`REDIRECT_PATH`].
    pub redirect: bool,
    /// Answer ranged GETs with the whole body and `200`.
    pub ignore_ranges: bool,
    /// Send this many body bytes of each data response, then stall for the
    /// given time before sending the rest.
    pub pause_body: Option<(usize, Duration)>,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub heads: AtomicUsize,
    pub gets: AtomicUsize,
    pub ranged_gets: AtomicUsize,
    pub not_modified: AtomicUsize,
    /// `(start, end inclusive)` of every ranged GET, with whether it was
    /// answered with data.
    pub ranges: Mutex<Vec<((u64, u64), bool)>>,
}

pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:12345`.
    pub base: String,
    pub counters: Arc<Counters>,
}

impl TestServer {
    /// URL of the body itself.
    pub fn data_url(&self) -> String {
        format!("{}{}", self.base, DATA_PATH)
    }

    pub fn redirect_url(&self) -> String {
        format!("{}{}", self.base, REDIRECT_PATH)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn gets(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.counters.heads.load(Ordering::SeqCst)
    }

    pub fn ranged_gets(&self) -> usize {
        self.counters.ranged_gets.load(Ordering::SeqCst)
    }

    /// Ranged GETs in arrival order.
    pub fn ranges(&self) -> Vec<((u64, u64), bool)> {
        self.counters.ranges.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

/// Starts the server on a background thread; it runs until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let counters = Arc::new(Counters::default());
    let shared = Arc::clone(&counters);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let counters = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &body, &opts, &counters));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        counters,
    }
}

struct Request {
    method: String,
    path: String,
    range: Option<(u64, u64)>,
    if_modified_since: Option<i64>,
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &ServerOptions, counters: &Counters) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let total = body.len() as u64;
    let last_modified = opts
        .last_modified
        .and_then(format_http_date)
        .map(|d| format!("Last-Modified: {d}\r\n"))
        .unwrap_or_default();

    if opts.redirect && req.path == REDIRECT_PATH {
        let head = format!("HTTP/1.1 302 Found\r\nLocation: {DATA_PATH}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        return;
    }
    if req.path != DATA_PATH {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    if req.method == "HEAD" {
        let seen = counters.heads.fetch_add(1, Ordering::SeqCst);
        if seen < opts.drop_first_heads {
            return;
        }
        let length = if opts.hide_length {
            String::new()
        } else {
            format!("Content-Length: {total}\r\n")
        };
        let head = format!("HTTP/1.1 200 OK\r\n{length}{last_modified}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        return;
    }
    if req.method != "GET" {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let seen = counters.gets.fetch_add(1, Ordering::SeqCst);
    let served = !opts.reject_gets && seen >= opts.fail_first_gets;
    if let Some(range) = req.range {
        counters.ranged_gets.fetch_add(1, Ordering::SeqCst);
        counters.ranges.lock().unwrap().push((range, served));
    }
    if opts.reject_gets {
        let _ = stream.write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    if seen < opts.fail_first_gets {
        let _ = stream.write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy");
        return;
    }
    if let (Some(lm), Some(since)) = (opts.last_modified, req.if_modified_since) {
        if lm <= since {
            counters.not_modified.fetch_add(1, Ordering::SeqCst);
            let head = format!("HTTP/1.1 304 Not Modified\r\n{last_modified}Connection: close\r\n\r\n");
            let _ = stream.write_all(head.as_bytes());
            return;
        }
    }

    let range = req.range.filter(|_| !opts.ignore_ranges);
    let (status, content_range, slice) = match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                ("416 Range Not Satisfiable", format!("Content-Range: bytes */{total}\r\n"), &body[0..0])
            } else {
                let slice = &body[start as usize..=end_incl as usize];
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes {start}-{end_incl}/{total}\r\n"),
                    slice,
                )
            }
        }
        None => ("200 OK", String::new(), body),
    };
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\n{content_range}{last_modified}Connection: close\r\n\r\n",
        slice.len()
    );
    let _ = stream.write_all(head.as_bytes());
    match opts.pause_body {
        Some((first, pause)) if first < slice.len() => {
            let _ = stream.write_all(&slice[..first]);
            let _ = stream.flush();
            thread::sleep(pause);
            let _ = stream.write_all(&slice[first..]);
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_ascii_uppercase();
    let path = first.next()?.to_string();
    let mut req = Request {
        method,
        path,
        range: None,
        if_modified_since: None,
    };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("range") {
            req.range = parse_range(value);
        } else if name.trim().eq_ignore_ascii_case("if-modified-since") {
            req.if_modified_since = parse_http_date(value);
        }
    }
    Some(req)
}

/// `bytes=X-Y` or `bytes=X-` as (start, end inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (a, b) = bounds.split_once('-')?;
    let start = a.trim().parse().ok()?;
    let end = match b.trim() {
        "" => u64::MAX,
        e => e.parse().ok()?,
    };
    Some((start, end))
}
