//! Content hashing for imported files.
//!
//! The file hash is the base-64 encoding of the SHA-256 digest with `/`
//! replaced by `_` so the hash can double as a thumbnail file name.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::types::StoreResult;

pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    STANDARD.encode(digest).replace('/', "_")
}

pub fn hash_file(path: &Path) -> StoreResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Hash calculation for the worker pool; the read + digest runs on the
/// blocking thread pool.
pub async fn hash_file_task(path: std::path::PathBuf) -> StoreResult<String> {
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| crate::types::StoreError::InvalidState(format!("hash task failed: {e}")))?
}
