//! Progress reporting for downloads (bytes done, ETA, rate).

use std::collections::VecDeque;
use std::time::Instant;

/// Snapshot of download progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes fetched so far (durable plus buffered).
    pub bytes_done: u64,
    /// Total file size in bytes (0 while unknown).
    pub total_bytes: u64,
    /// Current transfer rate, if the meter has enough samples.
    pub bytes_per_sec: Option<f64>,
}

impl ProgressStats {
    /// Estimated seconds remaining (None if the rate is unknown or 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        match self.bytes_per_sec {
            Some(rate) if rate > 0.0 => Some(remaining as f64 / rate),
            _ => None,
        }
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    tick: u64,
    value: u64,
}

/// Transfer rate over a sliding window of per-second samples.
///
/// Each sample holds a running byte total at a whole-second tick; the rate is
/// the difference between the newest and oldest samples over their tick span.
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    origin: Instant,
    samples: VecDeque<Sample>,
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedMeter {
    pub const MAX_SAMPLES: usize = 8;

    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            samples: VecDeque::with_capacity(Self::MAX_SAMPLES),
        }
    }

    fn now_tick(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }

    /// Add `delta` bytes received now to the running total.
    pub fn accum(&mut self, delta: u64) {
        let tick = self.now_tick();
        self.accum_at(tick, delta);
    }

    pub fn accum_at(&mut self, tick: u64, delta: u64) {
        let s = self.roll(tick);
        s.value = s.value.saturating_add(delta);
    }

    /// Bytes per second across the window; `None` until two ticks apart.
    pub fn speed(&self) -> Option<f64> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        let elapsed = last.tick.checked_sub(first.tick)?;
        if elapsed == 0 {
            return None;
        }
        Some(last.value.saturating_sub(first.value) as f64 / elapsed as f64)
    }

    /// Sample for `tick`, carrying the previous total into a new second.
    fn roll(&mut self, tick: u64) -> &mut Sample {
        let carried = self.samples.back().map(|s| s.value).unwrap_or(0);
        if self.samples.back().map(|s| s.tick) != Some(tick) {
            if self.samples.len() == Self::MAX_SAMPLES {
                self.samples.pop_front();
            }
            self.samples.push_back(Sample {
                tick,
                value: carried,
            });
        }
        let last = self.samples.len() - 1;
        &mut self.samples[last]
    }
}
