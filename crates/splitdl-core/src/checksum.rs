//! Whole-file SHA-256, computed after a transfer rather than inline.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare the file's digest against `expected` (hex, any case).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_path(path)?.eq_ignore_ascii_case(expected.trim()))
}
