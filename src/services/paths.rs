//! Portable image path handling.
//!
//! Stored paths use the literal prefixes `:?ocl/` (public collection) and
//! `:?scl/` (private collection) which get expanded against the configured
//! roots on load. This keeps the database portable across installs.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::services::config::Settings;
use crate::types::{StoreError, StoreResult};

pub const PUBLIC_COLLECTION_PREFIX: &str = ":?ocl/";
pub const PRIVATE_COLLECTION_PREFIX: &str = ":?scl/";

/// Expands a stored database path against the current settings. Paths
/// without a known prefix are returned untouched.
pub fn to_final_path(settings: &Settings, path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::new();
    }

    if let Some(rest) = path.strip_prefix(PUBLIC_COLLECTION_PREFIX) {
        return settings.public_collection.join(rest);
    }
    if let Some(rest) = path.strip_prefix(PRIVATE_COLLECTION_PREFIX) {
        return settings.private_collection.join(rest);
    }

    PathBuf::from(path)
}

/// Produces the stored form for a path inside one of the collection roots.
pub fn to_database_path(settings: &Settings, path: &Path) -> String {
    if let Ok(rest) = path.strip_prefix(&settings.private_collection) {
        return format!("{}{}", PRIVATE_COLLECTION_PREFIX, rest.to_string_lossy());
    }
    if let Ok(rest) = path.strip_prefix(&settings.public_collection) {
        return format!("{}{}", PUBLIC_COLLECTION_PREFIX, rest.to_string_lossy());
    }

    warn!("Path is not under a collection root: {:?}", path);
    format!("ERROR_DATABASIFYING:{}", path.to_string_lossy())
}

/// Moves a file, falling back to copy + size check + unlink when rename
/// crosses filesystems.
pub fn move_file(old_path: &Path, new_path: &Path) -> StoreResult<()> {
    if !old_path.exists() {
        return Err(StoreError::InvalidArgument(format!(
            "move source doesn't exist: {:?}",
            old_path
        )));
    }

    if let Some(parent) = new_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if fs::rename(old_path, new_path).is_ok() {
        return Ok(());
    }

    fs::copy(old_path, new_path)?;

    let source_len = fs::metadata(old_path)?.len();
    let target_len = fs::metadata(new_path)?.len();
    if source_len != target_len {
        fs::remove_file(new_path).ok();
        return Err(StoreError::Io(format!(
            "copied file size mismatch: {} != {}",
            source_len, target_len
        )));
    }

    fs::remove_file(old_path)?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod tests;
