//! `rdm sync` – conditional refresh of a cached file.

use anyhow::{Context, Result};
use rdm_core::cache::{self, SyncOutcome};
use std::path::Path;

pub async fn run_sync(url: &str, path: &Path) -> Result<()> {
    let url_owned = url.to_string();
    let path_owned = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || cache::sync(&url_owned, &path_owned, None))
        .await
        .context("sync task panicked")?
        .with_context(|| format!("sync {url}"))?;
    match outcome {
        SyncOutcome::Updated => println!("updated {}", path.display()),
        SyncOutcome::NotModified => println!("{} is up to date", path.display()),
    }
    Ok(())
}
