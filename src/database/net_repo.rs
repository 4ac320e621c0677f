//! Net galleries and their pending download files.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::database::{begin_savepoint, release_savepoint, rollback_savepoint, Store};
use crate::services::events::ChangeEvent;
use crate::types::models::{DbId, NetFileRow, NetGallery, NetGalleryRow};
use crate::types::StoreResult;

const GALLERY_COLUMNS: &str = "id, gallery_url, target_path, gallery_name, currently_scanned, \
                               is_downloaded, tags_string, deleted";
const FILE_COLUMNS: &str =
    "id, file_url, page_referrer, preferred_name, tags_list, belongs_to_gallery";

#[derive(Debug, Clone)]
pub struct NewNetGallery {
    pub gallery_url: String,
    pub target_path: String,
    pub gallery_name: String,
    pub tags_string: String,
}

pub async fn insert_net_gallery(
    store: &Store,
    conn: &mut SqliteConnection,
    new: &NewNetGallery,
) -> StoreResult<Arc<NetGallery>> {
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO net_gallery (gallery_url, target_path, gallery_name, tags_string) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&new.gallery_url)
    .bind(&new.target_path)
    .bind(&new.gallery_name)
    .bind(&new.tags_string)
    .fetch_one(&mut *conn)
    .await?;

    let row = NetGalleryRow {
        id,
        gallery_url: new.gallery_url.clone(),
        target_path: new.target_path.clone(),
        gallery_name: new.gallery_name.clone(),
        currently_scanned: String::new(),
        is_downloaded: false,
        tags_string: new.tags_string.clone(),
        deleted: false,
    };
    let gallery = store
        .loaded_galleries
        .resolve(id, || NetGallery::from_row(row));

    store.events.fire(ChangeEvent::NetGalleryCreated);
    store.events.fire(ChangeEvent::DownloadGalleryCreated);

    Ok(gallery)
}

pub async fn select_net_gallery_ids(
    conn: &mut SqliteConnection,
    only_not_downloaded: bool,
) -> StoreResult<Vec<DbId>> {
    let sql = if only_not_downloaded {
        "SELECT id FROM net_gallery WHERE deleted = 0 AND is_downloaded = 0 ORDER BY id"
    } else {
        "SELECT id FROM net_gallery WHERE deleted = 0 ORDER BY id"
    };
    Ok(sqlx::query_scalar(sql).fetch_all(&mut *conn).await?)
}

pub async fn select_net_gallery_by_id(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<NetGallery>>> {
    if let Some(existing) = store.loaded_galleries.get_if_loaded(id) {
        return Ok(Some(existing));
    }

    let row: Option<NetGalleryRow> = sqlx::query_as(&format!(
        "SELECT {GALLERY_COLUMNS} FROM net_gallery WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| store.loaded_galleries.resolve(id, || NetGallery::from_row(row))))
}

pub async fn update_net_gallery(
    conn: &mut SqliteConnection,
    gallery: &NetGallery,
) -> StoreResult<()> {
    let row = gallery.row();
    sqlx::query(
        "UPDATE net_gallery SET gallery_url = ?, target_path = ?, gallery_name = ?, \
         currently_scanned = ?, is_downloaded = ?, tags_string = ?, deleted = ? WHERE id = ?",
    )
    .bind(&row.gallery_url)
    .bind(&row.target_path)
    .bind(&row.gallery_name)
    .bind(&row.currently_scanned)
    .bind(row.is_downloaded)
    .bind(&row.tags_string)
    .bind(row.deleted)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_net_gallery_deleted(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
    deleted: bool,
) -> StoreResult<()> {
    sqlx::query("UPDATE net_gallery SET deleted = ? WHERE id = ?")
        .bind(deleted)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if let Some(gallery) = store.loaded_galleries.get_if_loaded(id) {
        gallery.set_deleted(deleted);
    }
    Ok(())
}

/// Permanently removes the gallery row and its files.
pub async fn purge_net_gallery(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM net_files WHERE belongs_to_gallery = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM net_gallery WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if let Some(gallery) = store.loaded_galleries.get_if_loaded(id) {
        gallery.set_deleted(true);
    }
    store.loaded_galleries.remove(id);
    Ok(())
}

// ─── Net files ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewNetFile {
    pub file_url: String,
    pub page_referrer: String,
    pub preferred_name: String,
    pub tags_list: String,
}

pub async fn insert_net_file(
    conn: &mut SqliteConnection,
    gallery: DbId,
    new: &NewNetFile,
) -> StoreResult<DbId> {
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO net_files (file_url, page_referrer, preferred_name, tags_list, \
         belongs_to_gallery) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&new.file_url)
    .bind(&new.page_referrer)
    .bind(&new.preferred_name)
    .bind(&new.tags_list)
    .bind(gallery)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn select_net_files_from_gallery(
    conn: &mut SqliteConnection,
    gallery: DbId,
) -> StoreResult<Vec<NetFileRow>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {FILE_COLUMNS} FROM net_files WHERE belongs_to_gallery = ? ORDER BY id"
    ))
    .bind(gallery)
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn select_net_file_by_id(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<NetFileRow>> {
    Ok(
        sqlx::query_as(&format!("SELECT {FILE_COLUMNS} FROM net_files WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub async fn update_net_file(conn: &mut SqliteConnection, file: &NetFileRow) -> StoreResult<()> {
    sqlx::query(
        "UPDATE net_files SET file_url = ?, page_referrer = ?, preferred_name = ?, \
         tags_list = ? WHERE id = ?",
    )
    .bind(&file.file_url)
    .bind(&file.page_referrer)
    .bind(&file.preferred_name)
    .bind(&file.tags_list)
    .bind(file.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_net_file(conn: &mut SqliteConnection, id: DbId) -> StoreResult<()> {
    sqlx::query("DELETE FROM net_files WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Replaces the gallery's files with a new set inside a savepoint so a
/// failing insert leaves the old set intact.
pub async fn replace_gallery_items(
    conn: &mut SqliteConnection,
    gallery: DbId,
    files: &[NewNetFile],
) -> StoreResult<()> {
    begin_savepoint(conn, "replace_net_files").await?;

    let result: StoreResult<()> = async {
        sqlx::query("DELETE FROM net_files WHERE belongs_to_gallery = ?")
            .bind(gallery)
            .execute(&mut *conn)
            .await?;
        for file in files {
            insert_net_file(conn, gallery, file).await?;
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => release_savepoint(conn, "replace_net_files").await,
        Err(e) => {
            rollback_savepoint(conn, "replace_net_files").await?;
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "tests/net_repo_tests.rs"]
mod tests;
