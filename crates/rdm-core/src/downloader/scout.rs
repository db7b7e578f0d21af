//! Scout stage: HEAD request for metadata and block store setup.

use std::path::Path;

use crate::block_store::BlockStore;
use crate::channel::ChannelState;
use crate::transport::Response;

use super::{Downloader, FetchError, Stage, Step};

impl Downloader {
    pub(super) fn scout(&mut self) -> Result<Step, FetchError> {
        let Some(scout) = self.workers.first_mut() else {
            return Err(FetchError::InvalidConfig("no channels allocated".into()));
        };
        if !scout.channel.is_open() {
            scout.channel.remove_range();
            scout.channel.open(&self.url, true)?;
        }
        match scout.channel.step() {
            ChannelState::Idle | ChannelState::Again => Ok(Step::Pending),
            ChannelState::Failed(err) => {
                scout.retry(err, &self.url, true, &self.options.retry)?;
                Ok(Step::Pending)
            }
            ChannelState::Done => self.on_scout_done(),
        }
    }

    fn on_scout_done(&mut self) -> Result<Step, FetchError> {
        let Some(scout) = self.workers.first_mut() else {
            return Err(FetchError::InvalidConfig("no channels allocated".into()));
        };
        let status = scout.channel.status();
        let content_length = scout.channel.response().and_then(Response::content_length);
        let effective_url = scout.channel.effective_url();
        scout.channel.close();
        scout.failures = 0;

        if status != 200 {
            return Err(FetchError::Failed { status });
        }
        if let (Some(expected), Some(actual)) = (self.expected_length, content_length) {
            if expected != actual {
                return Err(FetchError::FileSizeMismatch { expected, actual });
            }
        }
        let Some(length) = content_length else {
            return Err(FetchError::FileSizeUnknown);
        };

        let store = open_or_create(&self.path, length)?;
        self.pending = store.find_invalid_blocks();
        tracing::info!(
            length,
            blocks = store.block_count(),
            pending = self.pending.len(),
            effective_url = effective_url.as_deref().unwrap_or(&self.url),
            "scout complete"
        );
        self.total_length = Some(length);
        self.effective_url = effective_url;
        self.store = Some(store);
        self.stage = Stage::Download;
        Ok(Step::Pending)
    }
}

/// Resume from a journal that matches `length`, otherwise start fresh.
fn open_or_create(path: &Path, length: u64) -> Result<BlockStore, FetchError> {
    match BlockStore::open(path) {
        Ok(store) if store.length() == length => {
            tracing::info!(
                path = %path.display(),
                completed = store.completed_count(),
                "resuming from journal"
            );
            return Ok(store);
        }
        Ok(store) => {
            tracing::info!(
                path = %path.display(),
                old = store.length(),
                new = length,
                "remote length changed, starting over"
            );
            store.close();
        }
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "no usable journal"),
    }
    BlockStore::create(path, length).map_err(FetchError::OpenFileFailed)
}
