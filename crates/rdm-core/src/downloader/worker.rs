//! One channel of the pool plus the block it owns and its retry count.

use std::collections::VecDeque;

use crate::block_store::{BlockId, BlockStore};
use crate::channel::{Channel, ChannelState};
use crate::range::ByteRange;
use crate::retry::{classify, ErrorKind, RetryDecision, RetryPolicy, TransferError};
use crate::transport::Response;

use super::FetchError;

pub(super) struct Worker {
    pub(super) channel: Channel,
    /// Block held by this channel; never shared with another channel.
    pub(super) block: Option<BlockId>,
    /// Consecutive failures of the current request.
    pub(super) failures: u32,
}

impl Worker {
    pub(super) fn new(channel: Channel) -> Self {
        Self {
            channel,
            block: None,
            failures: 0,
        }
    }

    /// Reopen the same request after the policy's backoff, or give up.
    pub(super) fn retry(
        &mut self,
        err: TransferError,
        url: &str,
        head_only: bool,
        policy: &RetryPolicy,
    ) -> Result<(), FetchError> {
        self.failures += 1;
        let kind = classify(&err);
        match policy.decide(self.failures, kind) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    block = ?self.block,
                    attempt = self.failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "request failed, retrying"
                );
                self.channel.close();
                self.channel.defer(delay);
                self.channel.open(url, head_only)?;
                Ok(())
            }
            RetryDecision::NoRetry if kind == ErrorKind::Rejected => Err(FetchError::Rejected(err)),
            RetryDecision::NoRetry => Err(FetchError::RetriesExhausted {
                attempts: self.failures,
                last: err,
            }),
        }
    }

    /// Poll the channel once during the download stage; hand out the next
    /// pending block when the channel is free.
    pub(super) fn poll(
        &mut self,
        index: usize,
        store: &mut BlockStore,
        pending: &mut VecDeque<BlockId>,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<(), FetchError> {
        match self.channel.step() {
            ChannelState::Idle | ChannelState::Again => {}
            ChannelState::Done => match self.completed_block(store) {
                Ok(id) => {
                    store
                        .save_block(id, self.channel.body())
                        .map_err(FetchError::SaveBlockFailed)?;
                    tracing::debug!(block = id, channel = index, "block saved");
                    self.channel.close();
                    self.block = None;
                    self.failures = 0;
                }
                Err(err) => self.retry(err, url, false, policy)?,
            },
            ChannelState::Failed(err) => self.retry(err, url, false, policy)?,
        }

        if !self.channel.is_open() {
            while let Some(id) = pending.pop_front() {
                let Some(range) = store.block_info(id) else {
                    continue;
                };
                self.block = Some(id);
                self.channel.set_range(range);
                self.channel.require_partial(store.block_count() > 1);
                self.channel.open(url, false)?;
                tracing::debug!(block = id, channel = index, range = %range.curl_range(), "block assigned");
                break;
            }
        }
        Ok(())
    }

    /// Map a finished response back to the block it carries.
    fn completed_block(&self, store: &BlockStore) -> Result<BlockId, TransferError> {
        let status = self.channel.status();
        let received = self.channel.buffered_len();
        let range = match status {
            206 => self
                .channel
                .response()
                .and_then(Response::content_range)
                .map(|(r, _)| r)
                .ok_or(TransferError::UnexpectedRange {
                    status,
                    start: 0,
                    len: received,
                })?,
            // Server ignored the range; usable only when the body is exactly one block.
            200 => ByteRange::new(0, received),
            s => return Err(TransferError::Http(s)),
        };
        if range.len() != received {
            return Err(TransferError::PartialTransfer {
                expected: range.len(),
                received,
            });
        }
        match store.block_id(range.start, range.len()) {
            Some(id) if Some(id) == self.block => Ok(id),
            _ => Err(TransferError::UnexpectedRange {
                status,
                start: range.start,
                len: range.len(),
            }),
        }
    }
}
