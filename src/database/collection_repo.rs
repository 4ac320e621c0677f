//! Collection rows, membership links and show-order bookkeeping.

use std::sync::Arc;

use log::info;
use sqlx::SqliteConnection;

use crate::database::{Store, UNCATEGORIZED_COLLECTION_ID};
use crate::services::events::ChangeEvent;
use crate::types::models::{now_stamp, Collection, CollectionRow, DbId, Image};
use crate::types::{StoreError, StoreResult};

const COLLECTION_COLUMNS: &str =
    "id, name, is_private, add_date, modify_date, last_view, preview_image, deleted";

/// Case-insensitive name check over non-deleted collections.
pub async fn check_collection_name_in_use(
    conn: &mut SqliteConnection,
    name: &str,
    ignore_id: Option<DbId>,
) -> StoreResult<bool> {
    let existing: Option<DbId> = sqlx::query_scalar(
        "SELECT id FROM collections WHERE name = ? COLLATE NOCASE AND deleted = 0",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match existing {
        Some(id) => Some(id) != ignore_id,
        None => false,
    })
}

pub async fn insert_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
    is_private: bool,
) -> StoreResult<Arc<Collection>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "collection name may not be empty".into(),
        ));
    }
    if check_collection_name_in_use(conn, name, None).await? {
        return Err(StoreError::InvalidArgument(format!(
            "collection name is already in use: {name}"
        )));
    }

    let now = now_stamp();
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO collections (name, is_private, add_date, modify_date, last_view) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(is_private)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    let row = CollectionRow {
        id,
        name: name.to_string(),
        is_private,
        add_date: now.clone(),
        modify_date: now.clone(),
        last_view: now,
        preview_image: None,
        deleted: false,
    };

    let collection = store
        .loaded_collections
        .resolve(id, || Collection::from_row(row));

    store.events.fire(ChangeEvent::CollectionCreated);

    Ok(collection)
}

/// Renames a collection. Returns `(false, reason)` on a conflict rather
/// than erroring so the caller can show the message.
pub async fn rename_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: &Collection,
    new_name: &str,
) -> StoreResult<(bool, String)> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Ok((false, "name may not be empty".into()));
    }
    if check_collection_name_in_use(conn, new_name, Some(collection.id)).await? {
        return Ok((false, format!("name is already in use: {new_name}")));
    }

    sqlx::query("UPDATE collections SET name = ?, modify_date = ? WHERE id = ?")
        .bind(new_name)
        .bind(now_stamp())
        .bind(collection.id)
        .execute(&mut *conn)
        .await?;

    collection.set_name(new_name.to_string());
    if let Some(live) = store.loaded_collections.get_if_loaded(collection.id) {
        if live.name() != new_name {
            live.set_name(new_name.to_string());
        }
    }

    Ok((true, String::new()))
}

pub async fn update_collection(
    conn: &mut SqliteConnection,
    collection: &Collection,
) -> StoreResult<()> {
    let row = collection.row();
    sqlx::query(
        "UPDATE collections SET name = ?, is_private = ?, modify_date = ?, last_view = ?, \
         preview_image = ?, deleted = ? WHERE id = ?",
    )
    .bind(&row.name)
    .bind(row.is_private)
    .bind(&row.modify_date)
    .bind(&row.last_view)
    .bind(row.preview_image)
    .bind(row.deleted)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn select_collection_by_id(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<Collection>>> {
    if let Some(existing) = store.loaded_collections.get_if_loaded(id) {
        return Ok(Some(existing));
    }

    let row: Option<CollectionRow> = sqlx::query_as(&format!(
        "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| store.loaded_collections.resolve(id, || Collection::from_row(row))))
}

pub async fn select_collection_by_name(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
) -> StoreResult<Option<Arc<Collection>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT id FROM collections WHERE name = ? COLLATE NOCASE AND deleted = 0",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => select_collection_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_collection_name_by_id(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<String>> {
    Ok(sqlx::query_scalar("SELECT name FROM collections WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn select_collection_names_by_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
    max: i64,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT name FROM collections WHERE name LIKE ? AND deleted = 0 ORDER BY name LIMIT ?",
    )
    .bind(format!("%{pattern}%"))
    .bind(max)
    .fetch_all(&mut *conn)
    .await?)
}

/// Largest show_order used in the collection, 0 when empty.
pub async fn select_largest_show_order(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<i64> {
    let largest: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(show_order) FROM collection_image WHERE collection = ?",
    )
    .bind(collection)
    .fetch_one(&mut *conn)
    .await?;
    Ok(largest.unwrap_or(0))
}

pub async fn select_collection_image_count(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM collection_image WHERE collection = ?")
            .bind(collection)
            .fetch_one(&mut *conn)
            .await?,
    )
}

/// Adds the image with an explicit show order. Duplicate show orders are
/// tolerated; sibling order between them is unspecified.
pub async fn insert_image_to_collection(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
    show_order: i64,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO collection_image (collection, image, show_order) VALUES (?, ?, ?)",
    )
    .bind(collection)
    .bind(image)
    .bind(show_order)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Appends the image at the tail of the collection.
pub async fn add_image_to_collection(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
) -> StoreResult<bool> {
    let order = select_largest_show_order(conn, collection).await? + 1;
    insert_image_to_collection(conn, collection, image, order).await
}

pub async fn select_is_image_in_any_collection(
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM collection_image WHERE image = ? LIMIT 1")
            .bind(image)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

pub async fn select_is_image_in_collection(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
) -> StoreResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM collection_image WHERE collection = ? AND image = ? LIMIT 1",
    )
    .bind(collection)
    .bind(image)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

pub async fn select_collection_count_image_is_in(
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM collection_image WHERE image = ?")
            .bind(image)
            .fetch_one(&mut *conn)
            .await?,
    )
}

/// Removes the membership link. Does not touch Uncategorized; see
/// [`add_to_uncategorized_if_orphaned`].
pub async fn delete_image_from_collection(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM collection_image WHERE collection = ? AND image = ?")
        .bind(collection)
        .bind(image)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Re-parents an image to the Uncategorized sentinel when it no longer
/// belongs to any collection. Returns true if a link was inserted.
pub async fn add_to_uncategorized_if_orphaned(
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<bool> {
    if select_is_image_in_any_collection(conn, image).await? {
        return Ok(false);
    }
    info!("Image {image} ended up in no collection, adding to Uncategorized");
    add_image_to_collection(conn, UNCATEGORIZED_COLLECTION_ID, image).await
}

/// Non-deleted images in show order.
pub async fn select_images_in_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    limit: i64,
) -> StoreResult<Vec<Arc<Image>>> {
    let ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT ci.image FROM collection_image ci JOIN pictures p ON p.id = ci.image \
         WHERE ci.collection = ? AND p.deleted = 0 \
         ORDER BY ci.show_order, ci.image LIMIT ?",
    )
    .bind(collection)
    .bind(if limit < 0 { i64::MAX } else { limit })
    .fetch_all(&mut *conn)
    .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(image) =
            crate::database::image_repo::select_image_by_id(store, conn, id).await?
        {
            result.push(image);
        }
    }
    Ok(result)
}

pub async fn select_image_ids_and_show_order(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<Vec<(DbId, i64)>> {
    Ok(sqlx::query_as(
        "SELECT image, show_order FROM collection_image WHERE collection = ? \
         ORDER BY show_order, image",
    )
    .bind(collection)
    .fetch_all(&mut *conn)
    .await?)
}

/// The show_order the image has in the collection, or -1.
pub async fn select_image_show_order(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
) -> StoreResult<i64> {
    let order: Option<i64> = sqlx::query_scalar(
        "SELECT show_order FROM collection_image WHERE collection = ? AND image = ?",
    )
    .bind(collection)
    .bind(image)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(order.unwrap_or(-1))
}

/// One of the images at a show order; with duplicate orders the pick
/// between them is unspecified.
pub async fn select_image_by_show_order(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    show_order: i64,
) -> StoreResult<Option<Arc<Image>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT ci.image FROM collection_image ci JOIN pictures p ON p.id = ci.image \
         WHERE ci.collection = ? AND ci.show_order = ? AND p.deleted = 0 LIMIT 1",
    )
    .bind(collection)
    .bind(show_order)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => crate::database::image_repo::select_image_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_first_image_in_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<Option<Arc<Image>>> {
    Ok(select_images_in_collection(store, conn, collection, 1)
        .await?
        .into_iter()
        .next())
}

pub async fn select_last_image_in_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<Option<Arc<Image>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT ci.image FROM collection_image ci JOIN pictures p ON p.id = ci.image \
         WHERE ci.collection = ? AND p.deleted = 0 \
         ORDER BY ci.show_order DESC, ci.image DESC LIMIT 1",
    )
    .bind(collection)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => crate::database::image_repo::select_image_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_next_image_by_show_order(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    show_order: i64,
) -> StoreResult<Option<Arc<Image>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT ci.image FROM collection_image ci JOIN pictures p ON p.id = ci.image \
         WHERE ci.collection = ? AND ci.show_order > ? AND p.deleted = 0 \
         ORDER BY ci.show_order, ci.image LIMIT 1",
    )
    .bind(collection)
    .bind(show_order)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => crate::database::image_repo::select_image_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_previous_image_by_show_order(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    show_order: i64,
) -> StoreResult<Option<Arc<Image>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT ci.image FROM collection_image ci JOIN pictures p ON p.id = ci.image \
         WHERE ci.collection = ? AND ci.show_order < ? AND p.deleted = 0 \
         ORDER BY ci.show_order DESC, ci.image DESC LIMIT 1",
    )
    .bind(collection)
    .bind(show_order)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => crate::database::image_repo::select_image_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

/// All collections an image is in with its show order in each.
pub async fn select_collection_ids_image_is_in(
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<Vec<(DbId, i64)>> {
    Ok(sqlx::query_as(
        "SELECT collection, show_order FROM collection_image WHERE image = ? ORDER BY collection",
    )
    .bind(image)
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn update_image_show_order(
    conn: &mut SqliteConnection,
    collection: DbId,
    image: DbId,
    show_order: i64,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE collection_image SET show_order = ? WHERE collection = ? AND image = ?",
    )
    .bind(show_order)
    .bind(collection)
    .bind(image)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Rewrites show orders so the listed images come first in the given
/// sequence; unlisted images follow in their previous relative order.
pub async fn apply_collection_order(
    conn: &mut SqliteConnection,
    collection: DbId,
    ordered_images: &[DbId],
) -> StoreResult<()> {
    let existing = select_image_ids_and_show_order(conn, collection).await?;

    let mut next_order: i64 = 1;
    for &image in ordered_images {
        update_image_show_order(conn, collection, image, next_order).await?;
        next_order += 1;
    }

    for (image, _) in existing {
        if !ordered_images.contains(&image) {
            update_image_show_order(conn, collection, image, next_order).await?;
            next_order += 1;
        }
    }

    Ok(())
}

/// Soft-deletes or restores a collection. The Uncategorized sentinel may
/// not be deleted.
pub async fn set_collection_deleted(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
    deleted: bool,
) -> StoreResult<()> {
    if id == UNCATEGORIZED_COLLECTION_ID && deleted {
        return Err(StoreError::InvalidArgument(
            "the Uncategorized collection cannot be deleted".into(),
        ));
    }

    sqlx::query("UPDATE collections SET deleted = ? WHERE id = ?")
        .bind(deleted)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if let Some(collection) = store.loaded_collections.get_if_loaded(id) {
        collection.set_deleted(deleted);
    }
    Ok(())
}

/// The preview image if set, otherwise the first image.
pub async fn select_collection_preview_image(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: &Collection,
) -> StoreResult<Option<Arc<Image>>> {
    if let Some(preview) = collection.preview_image() {
        if let Some(image) =
            crate::database::image_repo::select_image_by_id_skip_deleted(store, conn, preview)
                .await?
        {
            return Ok(Some(image));
        }
    }
    select_first_image_in_collection(store, conn, collection.id).await
}

/// Permanently removes a collection row and its membership links.
pub async fn purge_collection(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<()> {
    if id == UNCATEGORIZED_COLLECTION_ID {
        return Err(StoreError::InvalidArgument(
            "the Uncategorized collection cannot be purged".into(),
        ));
    }

    sqlx::query("DELETE FROM collection_image WHERE collection = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM collections WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if let Some(collection) = store.loaded_collections.get_if_loaded(id) {
        collection.set_deleted(true);
    }
    store.loaded_collections.remove(id);
    Ok(())
}

#[cfg(test)]
#[path = "tests/collection_repo_tests.rs"]
mod tests;
