//! Importing image files into the managed collection tree.
//!
//! An import stages the file under the collection root, hashes it on the
//! blocking pool and either inserts a new row or, when the hash already
//! exists, hands back the existing image. The returned handle is the
//! same object other holders of that id see.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use walkdir::WalkDir;

use crate::database::{collection_repo, folder_repo, image_repo, Store};
use crate::services::config::Settings;
use crate::services::hashing;
use crate::services::images::codec;
use crate::services::paths;
use crate::types::models::Image;
use crate::types::{StoreError, StoreResult};

const IMPORTABLE_EXTENSIONS: [&str; 7] =
    ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];

#[derive(Debug)]
pub struct ImportOutcome {
    pub image: Arc<Image>,
    /// True when the file's hash matched an existing image and no new row
    /// was created.
    pub was_duplicate: bool,
}

fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Picks a free file name inside `dir`, appending `_N` when taken.
fn unique_target_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let extension = Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Imports one file into the named collection, creating the collection
/// when missing.
pub async fn import_file_to_collection(
    store: &Arc<Store>,
    settings: &Settings,
    source: &Path,
    collection_name: &str,
    is_private: bool,
) -> StoreResult<ImportOutcome> {
    if !source.is_file() {
        return Err(StoreError::InvalidArgument(format!(
            "import source doesn't exist: {}",
            source.display()
        )));
    }

    let Some((width, height, extension)) = codec::probe_image(source) else {
        return Err(StoreError::InvalidArgument(format!(
            "file is not a supported image: {}",
            source.display()
        )));
    };

    let hash = hashing::hash_file_task(source.to_path_buf()).await?;

    let mut conn = store.conn().await?;

    // Same content already imported: the new object becomes a handle to
    // the existing row.
    if let Some(existing) = image_repo::select_image_by_hash(store, &mut conn, &hash).await? {
        info!(
            "Import of {} matched existing image {} by hash",
            source.display(),
            existing.id
        );
        let collection =
            ensure_collection(store, &mut conn, collection_name, is_private).await?;
        collection_repo::add_image_to_collection(&mut conn, collection.id, existing.id).await?;
        return Ok(ImportOutcome {
            image: existing,
            was_duplicate: true,
        });
    }

    // Move the file into the collection tree.
    let root = if is_private {
        &settings.private_collection
    } else {
        &settings.public_collection
    };
    let target_dir = root
        .join("collections")
        .join(sanitize_component(collection_name));
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("image{extension}"));
    let target = unique_target_path(&target_dir, &file_name);

    paths::move_file(source, &target)?;

    let display_name = target
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());

    let new_image = image_repo::NewImage {
        relative_path: paths::to_database_path(settings, &target),
        width: width as i64,
        height: height as i64,
        name: display_name,
        extension,
        is_private,
        from_file: source.to_string_lossy().to_string(),
        file_hash: hash,
    };
    let image = image_repo::insert_image(store, &mut conn, &new_image).await?;

    let collection = ensure_collection(store, &mut conn, collection_name, is_private).await?;
    collection_repo::add_image_to_collection(&mut conn, collection.id, image.id).await?;

    Ok(ImportOutcome {
        image,
        was_duplicate: false,
    })
}

/// Existing collection by name or a fresh one linked under the root
/// folder.
async fn ensure_collection(
    store: &Arc<Store>,
    conn: &mut sqlx::SqliteConnection,
    name: &str,
    is_private: bool,
) -> StoreResult<Arc<crate::types::models::Collection>> {
    if let Some(existing) = collection_repo::select_collection_by_name(store, conn, name).await? {
        return Ok(existing);
    }

    let collection = collection_repo::insert_collection(store, conn, name, is_private).await?;
    folder_repo::insert_collection_to_root_if_in_none(conn, collection.id).await?;
    Ok(collection)
}

/// Imports every image file found under `dir` into the collection.
/// Non-image files are skipped; individual failures don't stop the scan.
pub async fn import_folder(
    store: &Arc<Store>,
    settings: &Settings,
    dir: &Path,
    collection_name: &str,
    is_private: bool,
) -> StoreResult<Vec<ImportOutcome>> {
    if !dir.is_dir() {
        return Err(StoreError::InvalidArgument(format!(
            "import folder doesn't exist: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Import scan error under {}: {e}", dir.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMPORTABLE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        match import_file_to_collection(store, settings, &file, collection_name, is_private).await
        {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("Skipping {}: {e}", file.display()),
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
#[path = "tests/imports_tests.rs"]
mod tests;
