//! Image rows and the image ↔ applied-tag link table.

use std::sync::Arc;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::database::Store;
use crate::types::models::{now_stamp, DbId, Image, ImageRow};
use crate::types::{StoreError, StoreResult};

const IMAGE_COLUMNS: &str = "id, relative_path, width, height, name, extension, add_date, \
                             last_view, is_private, from_file, file_hash, deleted";

/// Fields needed to insert a new image. Hash and dimensions must already
/// be computed.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub relative_path: String,
    pub width: i64,
    pub height: i64,
    pub name: String,
    pub extension: String,
    pub is_private: bool,
    pub from_file: String,
    pub file_hash: String,
}

pub async fn insert_image(
    store: &Store,
    conn: &mut SqliteConnection,
    new: &NewImage,
) -> StoreResult<Arc<Image>> {
    if new.file_hash.is_empty() {
        return Err(StoreError::InvalidArgument(
            "image must have a calculated hash before insert".into(),
        ));
    }

    let now = now_stamp();
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO pictures (relative_path, width, height, name, extension, add_date, \
         last_view, is_private, from_file, file_hash) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&new.relative_path)
    .bind(new.width)
    .bind(new.height)
    .bind(&new.name)
    .bind(&new.extension)
    .bind(&now)
    .bind(&now)
    .bind(new.is_private)
    .bind(&new.from_file)
    .bind(&new.file_hash)
    .fetch_one(&mut *conn)
    .await?;

    let row = ImageRow {
        id,
        relative_path: new.relative_path.clone(),
        width: new.width,
        height: new.height,
        name: new.name.clone(),
        extension: new.extension.clone(),
        add_date: now.clone(),
        last_view: now,
        is_private: new.is_private,
        from_file: new.from_file.clone(),
        file_hash: new.file_hash.clone(),
        deleted: false,
    };

    Ok(store.loaded_images.resolve(id, || Image::from_row(row)))
}

/// Persists the mutable fields of an image.
pub async fn update_image(conn: &mut SqliteConnection, image: &Image) -> StoreResult<()> {
    let row = image.row();
    sqlx::query(
        "UPDATE pictures SET relative_path = ?, width = ?, height = ?, name = ?, \
         extension = ?, last_view = ?, is_private = ?, from_file = ?, file_hash = ?, \
         deleted = ? WHERE id = ?",
    )
    .bind(&row.relative_path)
    .bind(row.width)
    .bind(row.height)
    .bind(&row.name)
    .bind(&row.extension)
    .bind(&row.last_view)
    .bind(row.is_private)
    .bind(&row.from_file)
    .bind(&row.file_hash)
    .bind(row.deleted)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn select_image_by_id(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<Image>>> {
    if let Some(existing) = store.loaded_images.get_if_loaded(id) {
        return Ok(Some(existing));
    }

    let row: Option<ImageRow> =
        sqlx::query_as(&format!("SELECT {IMAGE_COLUMNS} FROM pictures WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|row| store.loaded_images.resolve(id, || Image::from_row(row))))
}

pub async fn select_image_by_id_skip_deleted(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<Image>>> {
    let image = select_image_by_id(store, conn, id).await?;
    Ok(image.filter(|image| !image.is_deleted()))
}

/// Finds a non-deleted image carrying the hash.
pub async fn select_image_by_hash(
    store: &Store,
    conn: &mut SqliteConnection,
    hash: &str,
) -> StoreResult<Option<Arc<Image>>> {
    let id: Option<DbId> =
        sqlx::query_scalar("SELECT id FROM pictures WHERE file_hash = ? AND deleted = 0")
            .bind(hash)
            .fetch_optional(&mut *conn)
            .await?;

    match id {
        Some(id) => select_image_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_image_id_by_hash(
    conn: &mut SqliteConnection,
    hash: &str,
) -> StoreResult<Option<DbId>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM pictures WHERE file_hash = ? AND deleted = 0")
            .bind(hash)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub async fn select_image_name_by_id(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<String>> {
    Ok(sqlx::query_scalar("SELECT name FROM pictures WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Images that carry the given plain tag through any applied tag.
pub async fn select_images_by_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    tag_id: DbId,
) -> StoreResult<Vec<Arc<Image>>> {
    let ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT DISTINCT it.image FROM image_tag it \
         JOIN applied_tag at ON at.id = it.tag WHERE at.tag = ?",
    )
    .bind(tag_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(image) = select_image_by_id_skip_deleted(store, conn, id).await? {
            result.push(image);
        }
    }
    Ok(result)
}

/// Flips the soft-delete flag and keeps any live entity in sync.
pub async fn set_image_deleted(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
    deleted: bool,
) -> StoreResult<()> {
    sqlx::query("UPDATE pictures SET deleted = ? WHERE id = ?")
        .bind(deleted)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if let Some(image) = store.loaded_images.get_if_loaded(id) {
        image.set_deleted(deleted);
    }
    Ok(())
}

pub async fn select_image_paths(
    conn: &mut SqliteConnection,
    ids: &[DbId],
) -> StoreResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT relative_path FROM pictures WHERE id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(id);
    }
    qb.push(")");

    Ok(qb.build_query_scalar().fetch_all(&mut *conn).await?)
}

/// Permanently removes image rows. File removal is the caller's job; the
/// stored path is rewritten to a tombstone first so stale entity handles
/// can't resolve it anymore.
pub async fn purge_images(
    store: &Store,
    conn: &mut SqliteConnection,
    ids: &[DbId],
) -> StoreResult<()> {
    for &id in ids {
        sqlx::query("UPDATE pictures SET relative_path = '[deleted]' WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM pictures WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if let Some(image) = store.loaded_images.get_if_loaded(id) {
            image.set_relative_path("[deleted]".into());
            image.set_deleted(true);
        }
        store.loaded_images.remove(id);
    }
    Ok(())
}

/// Ids of all non-deleted images, oldest first.
pub async fn select_live_image_ids(conn: &mut SqliteConnection) -> StoreResult<Vec<DbId>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM pictures WHERE deleted = 0 ORDER BY id")
            .fetch_all(&mut *conn)
            .await?,
    )
}

#[cfg(test)]
#[path = "tests/image_repo_tests.rs"]
mod tests;
