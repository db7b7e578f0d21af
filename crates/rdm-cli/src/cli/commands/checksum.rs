//! `rdm checksum` – SHA-256 of a file, optionally checked against a known digest.

use anyhow::Result;
use rdm_core::checksum;
use std::path::Path;

pub fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    match expect {
        Some(expected) => {
            checksum::verify_sha256(path, expected)?;
            println!("{}: OK", path.display());
        }
        None => {
            let digest = checksum::sha256_file(path)?;
            println!("{}  {}", digest, path.display());
        }
    }
    Ok(())
}
