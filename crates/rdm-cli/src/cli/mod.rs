//! CLI for the RDM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rdm_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_get, run_inspect, run_sync};

/// Top-level CLI for the RDM download manager.
#[derive(Debug, Parser)]
#[command(name = "rdm")]
#[command(about = "RDM: resumable block download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a file, resuming from its journal if one exists.
    Get {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Output path (default: name from the server or the URL, in the current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Expected size in bytes; the download fails if the server disagrees.
        #[arg(long, value_name = "BYTES")]
        size: Option<u64>,
        /// Number of concurrent channels (overrides config).
        #[arg(long, value_name = "N")]
        channels: Option<usize>,
    },

    /// Show the journal state of a partial download.
    Inspect {
        /// Path of the target file (not the journal).
        path: PathBuf,
        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },

    /// Refresh a cached copy if the server has a newer one.
    Sync {
        url: String,
        path: PathBuf,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
        /// Fail unless the digest equals this hex string.
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                url,
                output,
                size,
                channels,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_get(&cfg, &url, output, size, channels).await?;
            }
            CliCommand::Inspect { path, json } => run_inspect(&path, json)?,
            CliCommand::Sync { url, path } => run_sync(&url, &path).await?,
            CliCommand::Checksum { path, expect } => run_checksum(&path, expect.as_deref())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
