//! Resumable fetch orchestrator.
//!
//! A [`Downloader`] walks three stages:
//!
//! 1. **Prepare**: validate URL and path, allocate the channel pool.
//! 2. **Scout**: HEAD the URL on channel 0 to learn the length and the
//!    post-redirect URL, then open the block store (resuming a valid journal)
//!    or create a fresh one.
//! 3. **Download**: hand pending blocks to idle channels in FIFO order and
//!    save each finished block; retry failed requests with backoff.
//!
//! Each call to [`Downloader::advance`] polls every channel once and returns
//! without blocking beyond the channel wait. After an error the downloader is
//! reset; the journal stays on disk, so the next attempt resumes.

mod error;
mod scout;
mod worker;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::block_store::{BlockId, BlockStore};
use crate::channel::{Channel, TransferOptions};
use crate::config::RdmConfig;
use crate::control::ProgressObserver;
use crate::retry::RetryPolicy;

pub use error::FetchError;

use worker::Worker;

/// Runtime settings of a download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Number of concurrent transfer channels.
    pub channels: usize,
    pub retry: RetryPolicy,
    pub transfer: TransferOptions,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            channels: 4,
            retry: RetryPolicy::default(),
            transfer: TransferOptions::default(),
        }
    }
}

impl DownloadOptions {
    pub fn from_config(cfg: &RdmConfig) -> Self {
        Self {
            channels: cfg.channels,
            retry: cfg.retry_policy(),
            transfer: cfg.transfer_options(),
        }
    }
}

/// Result of one [`Downloader::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The file is complete and the journal removed.
    Finished,
    /// Work remains; call `advance` again.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Scout,
    Download,
    Finished,
}

pub struct Downloader {
    options: DownloadOptions,
    stage: Stage,
    url: String,
    path: PathBuf,
    expected_length: Option<u64>,
    /// URL after redirects, used for every block request.
    effective_url: Option<String>,
    total_length: Option<u64>,
    workers: Vec<Worker>,
    store: Option<BlockStore>,
    pending: VecDeque<BlockId>,
    last_input: u64,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Self {
        Self {
            options,
            stage: Stage::Prepare,
            url: String::new(),
            path: PathBuf::new(),
            expected_length: None,
            effective_url: None,
            total_length: None,
            workers: Vec::new(),
            store: None,
            pending: VecDeque::new(),
            last_input: 0,
        }
    }

    /// Set the download target. `expected_length`, if given, must match the
    /// length the server reports.
    pub fn configure(&mut self, url: &str, path: &Path, expected_length: Option<u64>) {
        self.reset();
        self.url = url.to_string();
        self.path = path.to_path_buf();
        self.expected_length = expected_length;
    }

    /// Run one non-blocking step of the state machine.
    pub fn advance(&mut self) -> Result<Step, FetchError> {
        self.last_input = 0;
        let result = match self.stage {
            Stage::Prepare => self.prepare(),
            Stage::Scout => self.scout(),
            Stage::Download => self.download(),
            Stage::Finished => Ok(Step::Finished),
        };
        self.last_input += self
            .workers
            .iter_mut()
            .map(|w| w.channel.take_received())
            .sum::<u64>();
        if let Err(e) = &result {
            tracing::error!(url = %self.url, error = %e, "download failed");
            self.reset();
        }
        result
    }

    /// Drive the download to completion, reporting progress after every step.
    pub fn run(&mut self, observer: &mut dyn ProgressObserver) -> Result<(), FetchError> {
        loop {
            let step = self.advance()?;
            observer.on_input(self.last_input());
            let keep_going = observer.on_progress(self.fetched_size(), self.total_size());
            match step {
                Step::Finished => return Ok(()),
                Step::Pending if !keep_going => {
                    tracing::info!(url = %self.url, "download aborted by user");
                    self.reset();
                    return Err(FetchError::UserAbort);
                }
                Step::Pending => {}
            }
        }
    }

    /// Durable bytes plus bytes buffered in channels that hold a block.
    pub fn fetched_size(&self) -> u64 {
        if self.stage == Stage::Finished {
            return self.total_size();
        }
        let Some(store) = &self.store else {
            return 0;
        };
        let in_flight: u64 = self
            .workers
            .iter()
            .filter(|w| w.block.is_some())
            .map(|w| w.channel.buffered_len())
            .sum();
        store.written_size() + in_flight
    }

    /// Best known total length; 0 until discovered.
    pub fn total_size(&self) -> u64 {
        self.total_length.or(self.expected_length).unwrap_or(0)
    }

    /// Bytes received from the network during the last `advance`.
    pub fn last_input(&self) -> u64 {
        self.last_input
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close all channels and the store (keeping its files) and return to Prepare.
    pub fn reset(&mut self) {
        for w in &mut self.workers {
            w.channel.close();
        }
        self.workers.clear();
        if let Some(store) = self.store.take() {
            store.close();
        }
        self.pending.clear();
        self.effective_url = None;
        self.total_length = None;
        self.last_input = 0;
        self.stage = Stage::Prepare;
    }

    fn prepare(&mut self) -> Result<Step, FetchError> {
        validate_url(&self.url)?;
        if self.path.as_os_str().is_empty() {
            return Err(FetchError::InvalidConfig("no target path configured".into()));
        }
        if self.options.channels == 0 {
            return Err(FetchError::InvalidConfig("at least one channel is required".into()));
        }
        self.workers = (0..self.options.channels)
            .map(|_| Worker::new(Channel::new(self.options.transfer.clone())))
            .collect();
        tracing::info!(
            url = %self.url,
            path = %self.path.display(),
            channels = self.options.channels,
            "starting download"
        );
        self.stage = Stage::Scout;
        Ok(Step::Pending)
    }

    fn download(&mut self) -> Result<Step, FetchError> {
        if self.store.as_ref().is_some_and(BlockStore::has_finished) {
            return self.complete();
        }
        let url = self.effective_url.as_deref().unwrap_or(&self.url);
        let Some(store) = self.store.as_mut() else {
            return Err(FetchError::InvalidConfig("download stage without a block store".into()));
        };
        for (index, worker) in self.workers.iter_mut().enumerate() {
            worker.poll(index, store, &mut self.pending, url, &self.options.retry)?;
        }
        if store.has_finished() {
            return self.complete();
        }
        Ok(Step::Pending)
    }

    fn complete(&mut self) -> Result<Step, FetchError> {
        for w in &mut self.workers {
            w.channel.close();
        }
        if let Some(store) = self.store.take() {
            store.finish().map_err(FetchError::SaveBlockFailed)?;
        }
        self.stage = Stage::Finished;
        Ok(Step::Finished)
    }
}

fn validate_url(url: &str) -> Result<(), FetchError> {
    if url.is_empty() {
        return Err(FetchError::InvalidConfig("no URL configured".into()));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| FetchError::InvalidConfig(format!("invalid URL {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::InvalidConfig(format!("unsupported scheme {other}"))),
    }
}
