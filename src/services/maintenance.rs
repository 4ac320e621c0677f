//! Housekeeping: identity-map purge, applied-tag coalescing, orphaned
//! thumbnail cleanup, action description backfill and signature
//! bookkeeping.

use std::collections::HashSet;
use std::fs;

use log::{info, warn};

use crate::database::{
    action_repo, image_repo, signature_repo, tag_repo, Store,
};
use crate::services::actions::HistoryAction;
use crate::services::config::Settings;
use crate::types::models::DbId;
use crate::types::StoreResult;

/// Runs all maintenance tasks and returns a human-readable summary.
pub async fn run_maintenance(store: &Store, settings: &Settings) -> StoreResult<String> {
    store.purge_inactive_cache();

    let mut conn = store.conn().await?;
    let merged_tags = tag_repo::coalesce_applied_tags(&mut conn).await?;
    let backfilled = generate_missing_action_descriptions(&mut conn).await?;

    let hashes: Vec<String> =
        sqlx::query_scalar("SELECT file_hash FROM pictures WHERE file_hash != ''")
            .fetch_all(&mut *conn)
            .await?;
    drop(conn);

    let pruned = prune_orphaned_thumbnails(settings, &hashes)?;

    Ok(format!(
        "Maintenance complete. Coalesced {merged_tags} applied tags. \
         Backfilled {backfilled} action descriptions. Pruned {pruned} orphaned thumbnails."
    ))
}

/// Deletes thumbnail files whose name doesn't start with any known hash.
pub fn prune_orphaned_thumbnails(
    settings: &Settings,
    known_hashes: &[String],
) -> StoreResult<usize> {
    let dir = settings.thumbnail_folder();
    if !dir.is_dir() {
        return Ok(0);
    }

    let keep: HashSet<&str> = known_hashes.iter().map(|h| h.as_str()).collect();
    let mut deleted = 0;

    for entry in fs::read_dir(&dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Thumbnail scan error: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let stem = name.split('.').next().unwrap_or(&name);
        if !keep.contains(stem) && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!("Pruned {deleted} orphaned thumbnails");
    }
    Ok(deleted)
}

/// Fills in descriptions for action rows written before descriptions
/// existed.
pub async fn generate_missing_action_descriptions(
    conn: &mut sqlx::SqliteConnection,
) -> StoreResult<usize> {
    let rows = action_repo::select_actions_without_description(conn).await?;
    let mut updated = 0;

    for row in rows {
        match HistoryAction::from_stored(row.action_type, &row.json_data) {
            Ok(action) => {
                action_repo::update_action(
                    conn,
                    row.id,
                    row.performed,
                    &row.json_data,
                    &action.generate_description(),
                )
                .await?;
                updated += 1;
            }
            Err(e) => warn!("Can't describe action {}: {e}", row.id),
        }
    }

    Ok(updated)
}

/// Non-deleted images that still lack a perceptual-hash signature.
pub async fn select_images_missing_signature(store: &Store) -> StoreResult<Vec<DbId>> {
    let mut conn = store.conn().await?;
    let live = image_repo::select_live_image_ids(&mut conn).await?;
    drop(conn);

    let mut sig_conn = store.signature_pool().acquire().await?;
    signature_repo::filter_ids_without_signature(&mut sig_conn, &live).await
}

/// Stores a computed signature and caches it on the live entity.
pub async fn store_image_signature(
    store: &Store,
    image: DbId,
    signature: &str,
) -> StoreResult<()> {
    let mut sig_conn = store.signature_pool().acquire().await?;
    signature_repo::insert_signature(&mut sig_conn, image, signature).await?;
    drop(sig_conn);

    let mut conn = store.conn().await?;
    if let Some(entity) = image_repo::select_image_by_id(store, &mut conn, image).await? {
        entity.set_cached_signature(Some(signature.to_string()));
    }
    Ok(())
}

/// Fetches a signature, going to the auxiliary store only on a cache
/// miss.
pub async fn load_image_signature(store: &Store, image: DbId) -> StoreResult<Option<String>> {
    let mut conn = store.conn().await?;
    let entity = image_repo::select_image_by_id(store, &mut conn, image).await?;
    drop(conn);

    if let Some(entity) = &entity {
        if let Some(cached) = entity.cached_signature() {
            return Ok(cached);
        }
    }

    let mut sig_conn = store.signature_pool().acquire().await?;
    let signature = signature_repo::select_signature_by_id(&mut sig_conn, image).await?;

    if let Some(entity) = entity {
        entity.set_cached_signature(signature.clone());
    }
    Ok(signature)
}

#[cfg(test)]
#[path = "tests/maintenance_tests.rs"]
mod tests;
