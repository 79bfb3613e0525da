//! `splitdl checksum` – SHA-256 of a file.

use anyhow::Result;
use splitdl_core::checksum;
use std::path::Path;

pub fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    let digest = checksum::sha256_path(path)?;
    println!("{}  {}", digest, path.display());
    if let Some(expected) = expect {
        if !digest.eq_ignore_ascii_case(expected.trim()) {
            anyhow::bail!("checksum mismatch: expected {}", expected.trim());
        }
    }
    Ok(())
}
