use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::TransferOptions;
use crate::retry::RetryPolicy;

/// Backoff parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/rdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdmConfig {
    /// Concurrent transfer channels per download.
    pub channels: usize,
    /// Retries per request (HEAD or block) before the download fails.
    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    /// Abort a transfer slower than `low_speed_limit` bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    pub max_redirects: u32,
    /// Socket wait per channel step, in milliseconds.
    pub wait_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Optional backoff tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            max_retries: 256,
            connect_timeout_secs: 60,
            low_speed_limit: 8,
            low_speed_time_secs: 60,
            max_redirects: 5,
            wait_ms: 5,
            user_agent: None,
            retry: None,
        }
    }
}

impl RdmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = self.retry.clone().unwrap_or_default();
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs_f64(backoff.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(backoff.max_delay_secs),
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_limit: self.low_speed_limit,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            max_redirects: self.max_redirects,
            wait: Duration::from_millis(self.wait_ms),
            user_agent: self.user_agent.clone(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
