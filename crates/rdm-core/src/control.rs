//! Progress callbacks and user abort.
//!
//! A fetch loop reports progress to a [`ProgressObserver`] after every step;
//! an observer returning `false` stops the fetch with a user abort. Network
//! input of the step is reported first through `on_input`, which is what a
//! rate meter should count. The CLI wires Ctrl-C to an [`AbortToken`] that
//! its observer checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives `(downloaded, total)` byte counts; return `false` to abort.
pub trait ProgressObserver {
    /// Bytes received from the network since the previous report.
    fn on_input(&mut self, _bytes: u64) {}

    fn on_progress(&mut self, downloaded: u64, total: u64) -> bool;
}

impl<F> ProgressObserver for F
where
    F: FnMut(u64, u64) -> bool,
{
    fn on_progress(&mut self, downloaded: u64, total: u64) -> bool {
        self(downloaded, total)
    }
}

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
