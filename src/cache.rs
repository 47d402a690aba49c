//! On-disk kernel/shader cache (§4.6, §6 `dataset-cache`/compile paths).
//!
//! Keyed by `BLAKE3(kernel_name || ":" || bits)`. The cache directory is
//! resolved from the `HARMONICS_SHADER_CACHE` env var, falling back to
//! `shader_cache` in the current directory. Writes go to a temp file in
//! the same directory and are renamed into place, so a crash mid-write
//! never leaves a half-written cache entry visible to a concurrent reader.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::hash::ContentHash;

const ENV_VAR: &str = "HARMONICS_SHADER_CACHE";
const DEFAULT_DIR: &str = "shader_cache";

pub fn cache_dir() -> PathBuf {
    std::env::var_os(ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
}

pub fn key_for(kernel_name: &str, bits: u32) -> ContentHash {
    ContentHash::of_parts(&[kernel_name.as_bytes(), b":", bits.to_string().as_bytes()])
}

pub fn load(key: ContentHash) -> io::Result<Option<Vec<u8>>> {
    let path = entry_path(&cache_dir(), key);
    match fs::read(&path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Store `bytes` under `key`, writing to a sibling temp file first and
/// renaming into place for atomicity.
pub fn store(key: ContentHash, bytes: &[u8]) -> io::Result<()> {
    let dir = cache_dir();
    fs::create_dir_all(&dir)?;
    let final_path = entry_path(&dir, key);
    let tmp_path = dir.join(format!("{}.tmp-{}", key.to_hex(), std::process::id()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

fn entry_path(dir: &Path, key: ContentHash) -> PathBuf {
    dir.join(format!("{}.bin", key.to_hex()))
}
