//! `rdm inspect` – journal state of a partial download.

use anyhow::{Context, Result};
use rdm_core::block_store::{journal_path, BlockId, BlockStore, BLOCK_SIZE};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct InspectReport {
    path: String,
    journal: String,
    length: u64,
    block_size: u64,
    blocks: usize,
    completed: usize,
    written: u64,
    pending: Vec<BlockId>,
}

pub fn run_inspect(path: &Path, json: bool) -> Result<()> {
    let store = BlockStore::open(path)
        .with_context(|| format!("no usable journal for {}", path.display()))?;
    let report = InspectReport {
        path: path.display().to_string(),
        journal: journal_path(path).display().to_string(),
        length: store.length(),
        block_size: BLOCK_SIZE,
        blocks: store.block_count(),
        completed: store.completed_count(),
        written: store.written_size(),
        pending: store.find_invalid_blocks().into_iter().collect(),
    };
    store.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("file:     {}", report.path);
    println!("journal:  {}", report.journal);
    println!("length:   {} bytes", report.length);
    println!(
        "blocks:   {}/{} complete ({} bytes written)",
        report.completed, report.blocks, report.written
    );
    if !report.pending.is_empty() {
        println!("pending:  {}", format_ids(&report.pending));
    }
    Ok(())
}

/// Compact id list: `0-3, 7, 9-10`.
fn format_ids(ids: &[BlockId]) -> String {
    let mut runs: Vec<(BlockId, BlockId)> = Vec::new();
    for &id in ids {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == id => *end = id,
            _ => runs.push((id, id)),
        }
    }
    runs.iter()
        .map(|&(a, b)| if a == b { a.to_string() } else { format!("{a}-{b}") })
        .collect::<Vec<_>>()
        .join(", ")
}
