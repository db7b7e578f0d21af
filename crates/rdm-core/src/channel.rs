//! Transfer channel: one in-flight request bound to one reusable connection.
//!
//! The orchestrator drives channels through [`Channel::step`], which never
//! blocks longer than the configured wait. A finished channel keeps reporting
//! `Done` or `Failed` until it is closed.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::range::ByteRange;
use crate::retry::TransferError;
use crate::transport::{BufferSink, ConnResult, Connection, Method, Response, TransportError};

/// Transport tuning shared by every channel.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
    pub max_redirects: u32,
    /// Upper bound on the socket wait inside one `step`.
    pub wait: Duration,
    pub user_agent: Option<String>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            low_speed_limit: 8,
            low_speed_time: Duration::from_secs(60),
            max_redirects: 5,
            wait: Duration::from_millis(5),
            user_agent: None,
        }
    }
}

/// Observable state of a channel after one step.
#[derive(Debug, Clone)]
pub enum ChannelState {
    /// Not open.
    Idle,
    /// Response complete; body available until close.
    Done,
    /// Waiting for the response.
    Again,
    Failed(TransferError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is already open")]
    AlreadyOpen,
    #[error("channel setup failed: {0}")]
    Setup(#[from] TransportError),
}

pub struct Channel {
    conn: Connection<BufferSink>,
    options: TransferOptions,
    range: Option<ByteRange>,
    open: bool,
    /// Latched result of the finished transfer.
    outcome: Option<ChannelState>,
    not_before: Option<Instant>,
    /// Received bytes of released requests not yet taken.
    carried: u64,
}

impl Channel {
    pub fn new(options: TransferOptions) -> Self {
        Self {
            conn: Connection::new(BufferSink::default()),
            options,
            range: None,
            open: false,
            outcome: None,
            not_before: None,
            carried: 0,
        }
    }

    /// Configure a request for `url`. With `head_only` the request is a
    /// HEAD; otherwise a GET limited to the current range, if any.
    pub fn open(&mut self, url: &str, head_only: bool) -> Result<(), ChannelError> {
        if self.open {
            return Err(ChannelError::AlreadyOpen);
        }
        self.release();
        self.conn.set_url(url)?;
        self.conn
            .set_method(if head_only { Method::Head } else { Method::Get })?;
        self.conn.set_connect_timeout(self.options.connect_timeout)?;
        self.conn
            .set_low_speed_limit(self.options.low_speed_limit, self.options.low_speed_time)?;
        self.conn.set_redirects(true, self.options.max_redirects)?;
        if let Some(agent) = &self.options.user_agent {
            self.conn.set_user_agent(agent)?;
        }
        if !head_only {
            if let Some(range) = &self.range {
                self.conn.set_range(range)?;
            }
        }
        self.open = true;
        self.outcome = None;
        Ok(())
    }

    /// Range for the next [`open`](Self::open).
    pub fn set_range(&mut self, range: ByteRange) {
        self.range = Some(range);
    }

    pub fn remove_range(&mut self) {
        self.range = None;
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    /// Refuse a `200` answer to a ranged GET as soon as its body starts,
    /// instead of buffering a whole file that cannot be used as one block.
    pub fn require_partial(&mut self, on: bool) {
        if let Some(sink) = self.conn.sink_mut() {
            sink.set_refuse_full_body(on);
        }
    }

    /// Hold the start of the next transfer until `delay` has passed.
    pub fn defer(&mut self, delay: Duration) {
        self.not_before = if delay.is_zero() {
            None
        } else {
            Some(Instant::now() + delay)
        };
    }

    /// Advance the request by one non-blocking step.
    pub fn step(&mut self) -> ChannelState {
        if !self.open {
            return ChannelState::Idle;
        }
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        if let Some(at) = self.not_before {
            let now = Instant::now();
            if now < at {
                std::thread::sleep((at - now).min(self.options.wait));
                return ChannelState::Again;
            }
            self.not_before = None;
        }

        let state = match self.conn.perform_async() {
            ConnResult::Again => {
                self.conn.wait(self.options.wait.as_millis() as u64);
                return ChannelState::Again;
            }
            ConnResult::Ok => ChannelState::Done,
            ConnResult::Timeout | ConnResult::PartialDone | ConnResult::Failed => {
                if let Some(status) = self.conn.sink().and_then(BufferSink::refused) {
                    ChannelState::Failed(TransferError::UnexpectedRange {
                        status,
                        start: 0,
                        len: self.buffered_len(),
                    })
                } else {
                    let err = self
                        .conn
                        .last_error()
                        .cloned()
                        .unwrap_or(TransportError::Detached);
                    ChannelState::Failed(TransferError::Transport(err))
                }
            }
        };
        self.outcome = Some(state.clone());
        state
    }

    /// Drop the response and release the request. The range is kept so a
    /// failed block can be reopened as is.
    pub fn close(&mut self) {
        self.release();
        self.open = false;
        self.outcome = None;
    }

    fn release(&mut self) {
        self.carried += self.conn.take_received();
        self.conn.reset();
        if let Some(sink) = self.conn.sink_mut() {
            sink.clear();
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// URL after redirects, once the request has finished.
    pub fn effective_url(&mut self) -> Option<String> {
        self.conn.effective_url()
    }

    pub fn response(&self) -> Option<&Response> {
        self.conn.response()
    }

    pub fn status(&self) -> u32 {
        self.conn.status()
    }

    pub fn body(&self) -> &[u8] {
        self.conn.sink().map(BufferSink::as_slice).unwrap_or(&[])
    }

    /// Body bytes held in memory.
    pub fn buffered_len(&self) -> u64 {
        self.conn.sink().map(|s| s.len() as u64).unwrap_or(0)
    }

    /// Body bytes received since the previous call, including requests
    /// closed in between.
    pub fn take_received(&mut self) -> u64 {
        std::mem::take(&mut self.carried) + self.conn.take_received()
    }
}
