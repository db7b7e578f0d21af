//! `rdm get` – resumable download with a progress line.
//!
//! The fetch loop runs on a blocking thread; Ctrl-C flips an abort token that
//! the progress observer checks, so the loop stops between steps and leaves
//! the journal on disk.

use anyhow::{bail, Context, Result};
use rdm_core::config::RdmConfig;
use rdm_core::control::{AbortToken, ProgressObserver};
use rdm_core::downloader::{DownloadOptions, Downloader, FetchError};
use rdm_core::naming;
use rdm_core::progress::{ProgressStats, SpeedMeter};
use rdm_core::transport;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_get(
    cfg: &RdmConfig,
    url: &str,
    output: Option<PathBuf>,
    size: Option<u64>,
    channels: Option<usize>,
) -> Result<()> {
    let mut options = DownloadOptions::from_config(cfg);
    if let Some(n) = channels {
        options.channels = n;
    }
    let path = match output {
        Some(p) => p,
        None => default_output(url, &options).await?,
    };

    let abort = AbortToken::new();
    let on_ctrl_c = abort.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.request_abort();
        }
    });

    let url_owned = url.to_string();
    let target = path.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut downloader = Downloader::new(options);
        downloader.configure(&url_owned, &target, size);
        let mut line = ProgressLine::new(abort);
        let result = downloader.run(&mut line);
        line.finish();
        result
    })
    .await
    .context("download task panicked")?;
    signal.abort();

    match result {
        Ok(()) => {
            println!("saved {}", path.display());
            Ok(())
        }
        Err(FetchError::UserAbort) => {
            bail!("interrupted; run the same command again to resume {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("download {url}")),
    }
}

/// Name from `Content-Disposition` or the final URL, in the current directory.
async fn default_output(url: &str, options: &DownloadOptions) -> Result<PathBuf> {
    let url_owned = url.to_string();
    let timeout = options.transfer.connect_timeout;
    let redirects = options.transfer.max_redirects;
    let head = tokio::task::spawn_blocking(move || transport::head(&url_owned, timeout, redirects))
        .await
        .context("HEAD task panicked")?;
    let name = match head {
        Ok(p) => naming::local_name(
            p.effective_url.as_deref().unwrap_or(url),
            p.content_disposition.as_deref(),
        ),
        Err(e) => {
            tracing::debug!(url, error = %e, "HEAD for file name failed, using URL path");
            naming::local_name(url, None)
        }
    };
    Ok(std::env::current_dir()?.join(name))
}

/// Progress observer that prints a status line to stderr and honours Ctrl-C.
struct ProgressLine {
    abort: AbortToken,
    meter: SpeedMeter,
    last_print: Option<Instant>,
    printed: bool,
}

impl ProgressLine {
    fn new(abort: AbortToken) -> Self {
        Self {
            abort,
            meter: SpeedMeter::new(),
            last_print: None,
            printed: false,
        }
    }

    fn print(&mut self, stats: &ProgressStats) {
        let done_mib = stats.bytes_done as f64 / 1_048_576.0;
        let total_mib = stats.total_bytes as f64 / 1_048_576.0;
        let rate_mib = stats.bytes_per_sec.unwrap_or(0.0) / 1_048_576.0;
        let eta = stats
            .eta_secs()
            .map(|s| format!("{:.0}s", s))
            .unwrap_or_else(|| "?".to_string());
        let mut err = std::io::stderr().lock();
        let _ = write!(
            err,
            "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
            done_mib,
            total_mib,
            stats.fraction() * 100.0,
            rate_mib,
            eta
        );
        let _ = err.flush();
        self.printed = true;
    }

    fn finish(&self) {
        if self.printed {
            eprintln!();
        }
    }
}

impl ProgressObserver for ProgressLine {
    fn on_input(&mut self, bytes: u64) {
        self.meter.accum(bytes);
    }

    fn on_progress(&mut self, downloaded: u64, total: u64) -> bool {
        let due = self
            .last_print
            .map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL);
        if total > 0 && (due || downloaded >= total) {
            let stats = ProgressStats {
                bytes_done: downloaded,
                total_bytes: total,
                bytes_per_sec: self.meter.speed(),
            };
            self.print(&stats);
            self.last_print = Some(Instant::now());
        }
        !self.abort.is_aborted()
    }
}
