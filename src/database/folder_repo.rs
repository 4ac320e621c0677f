//! Virtual folder hierarchy: folders contain collections and sub-folders.
//!
//! A folder may sit under multiple parents; `(parent, child name)` must be
//! unique per parent. Collections always live in at least one folder with
//! the root as the fallback.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::database::{Store, ROOT_FOLDER_ID};
use crate::services::events::ChangeEvent;
use crate::types::models::{Collection, DbId, Folder, FolderRow};
use crate::types::{StoreError, StoreResult};

const FOLDER_COLUMNS: &str = "id, name, is_private, deleted";

/// Seeds the well-known root folder. Only valid on a fresh database.
pub async fn insert_root_folder(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query("INSERT INTO virtual_folders (id, name, is_private) VALUES (?, 'Root', 0)")
        .bind(ROOT_FOLDER_ID)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn select_root_folder(
    store: &Store,
    conn: &mut SqliteConnection,
) -> StoreResult<Arc<Folder>> {
    select_folder_by_id(store, conn, ROOT_FOLDER_ID)
        .await?
        .ok_or_else(|| StoreError::InvalidState("root folder is missing".into()))
}

pub async fn select_folder_by_id(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<Folder>>> {
    if let Some(existing) = store.loaded_folders.get_if_loaded(id) {
        return Ok(Some(existing));
    }

    let row: Option<FolderRow> = sqlx::query_as(&format!(
        "SELECT {FOLDER_COLUMNS} FROM virtual_folders WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| store.loaded_folders.resolve(id, || Folder::from_row(row))))
}

/// Creates a folder under `parent`. Returns None when a sibling with the
/// name already exists.
pub async fn insert_folder(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
    is_private: bool,
    parent: &Folder,
) -> StoreResult<Option<Arc<Folder>>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "folder name may not be empty".into(),
        ));
    }

    if select_folder_by_name_and_parent(store, conn, name, parent.id)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let id: DbId = sqlx::query_scalar(
        "INSERT INTO virtual_folders (name, is_private) VALUES (?, ?) RETURNING id",
    )
    .bind(name)
    .bind(is_private)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO folder_folder (parent, child) VALUES (?, ?)")
        .bind(parent.id)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let row = FolderRow {
        id,
        name: name.to_string(),
        is_private,
        deleted: false,
    };
    let folder = store.loaded_folders.resolve(id, || Folder::from_row(row));

    store.events.fire(ChangeEvent::FolderCreated);

    Ok(Some(folder))
}

pub async fn update_folder(conn: &mut SqliteConnection, folder: &Folder) -> StoreResult<()> {
    let row = folder.row();
    sqlx::query("UPDATE virtual_folders SET name = ?, is_private = ?, deleted = ? WHERE id = ?")
        .bind(&row.name)
        .bind(row.is_private)
        .bind(row.deleted)
        .bind(row.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Renames a folder unless any parent already has a child with the new
/// name. Returns `(false, reason)` on conflict.
pub async fn rename_folder(
    store: &Store,
    conn: &mut SqliteConnection,
    folder: &Folder,
    new_name: &str,
) -> StoreResult<(bool, String)> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Ok((false, "name may not be empty".into()));
    }
    if folder.id == ROOT_FOLDER_ID {
        return Ok((false, "the root folder cannot be renamed".into()));
    }

    if let Some(conflict_parent) =
        select_first_parent_with_child_named(store, conn, folder, new_name).await?
    {
        return Ok((
            false,
            format!(
                "a folder named {} already exists in parent {}",
                new_name,
                conflict_parent.name()
            ),
        ));
    }

    folder.set_name(new_name.to_string());
    update_folder(conn, folder).await?;
    Ok((true, String::new()))
}

// ─── Folder ↔ collection ─────────────────────────────────────────

/// Links a collection into a folder. When the target is not the root and
/// the collection sat in root, the root link is removed.
pub async fn insert_collection_to_folder(
    conn: &mut SqliteConnection,
    folder: DbId,
    collection: DbId,
) -> StoreResult<bool> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO folder_collection (parent, child) VALUES (?, ?)")
            .bind(folder)
            .bind(collection)
            .execute(&mut *conn)
            .await?;

    if folder != ROOT_FOLDER_ID {
        delete_collection_from_root_if_in_another_folder(conn, collection).await?;
    }

    Ok(result.rows_affected() > 0)
}

/// Unlinks a collection from a folder; re-adds to root when the
/// collection would end up folderless.
pub async fn delete_collection_from_folder(
    conn: &mut SqliteConnection,
    folder: DbId,
    collection: DbId,
) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM folder_collection WHERE parent = ? AND child = ?")
        .bind(folder)
        .bind(collection)
        .execute(&mut *conn)
        .await?;

    insert_collection_to_root_if_in_none(conn, collection).await?;

    Ok(result.rows_affected() > 0)
}

pub async fn select_collection_is_in_folder(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM folder_collection WHERE child = ? LIMIT 1")
            .bind(collection)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

pub async fn select_collection_is_in_another_folder(
    conn: &mut SqliteConnection,
    folder: DbId,
    collection: DbId,
) -> StoreResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM folder_collection WHERE child = ? AND parent != ? LIMIT 1",
    )
    .bind(collection)
    .bind(folder)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

pub async fn select_folders_collection_is_in(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<Vec<DbId>> {
    Ok(
        sqlx::query_scalar("SELECT parent FROM folder_collection WHERE child = ? ORDER BY parent")
            .bind(collection)
            .fetch_all(&mut *conn)
            .await?,
    )
}

pub async fn delete_collection_from_root_if_in_another_folder(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<()> {
    if select_collection_is_in_another_folder(conn, ROOT_FOLDER_ID, collection).await? {
        sqlx::query("DELETE FROM folder_collection WHERE parent = ? AND child = ?")
            .bind(ROOT_FOLDER_ID)
            .bind(collection)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn insert_collection_to_root_if_in_none(
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<()> {
    if !select_collection_is_in_folder(conn, collection).await? {
        sqlx::query("INSERT OR IGNORE INTO folder_collection (parent, child) VALUES (?, ?)")
            .bind(ROOT_FOLDER_ID)
            .bind(collection)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Collections directly in the folder, optionally name-filtered.
pub async fn select_collections_in_folder(
    store: &Store,
    conn: &mut SqliteConnection,
    folder: DbId,
    matching_pattern: &str,
) -> StoreResult<Vec<Arc<Collection>>> {
    let ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT c.id FROM folder_collection fc JOIN collections c ON c.id = fc.child \
         WHERE fc.parent = ? AND c.deleted = 0 AND c.name LIKE ? ORDER BY c.name",
    )
    .bind(folder)
    .bind(format!("%{matching_pattern}%"))
    .fetch_all(&mut *conn)
    .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(collection) =
            crate::database::collection_repo::select_collection_by_id(store, conn, id).await?
        {
            result.push(collection);
        }
    }
    Ok(result)
}

// ─── Folder ↔ folder ─────────────────────────────────────────────

/// Links a folder under a parent. Rejects duplicate child names within
/// the parent.
pub async fn insert_folder_to_folder(
    conn: &mut SqliteConnection,
    child: &Folder,
    parent: DbId,
) -> StoreResult<bool> {
    let conflict: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM folder_folder ff JOIN virtual_folders vf ON vf.id = ff.child \
         WHERE ff.parent = ? AND vf.name = ? COLLATE NOCASE AND vf.id != ? LIMIT 1",
    )
    .bind(parent)
    .bind(child.name())
    .bind(child.id)
    .fetch_optional(&mut *conn)
    .await?;
    if conflict.is_some() {
        return Ok(false);
    }

    sqlx::query("INSERT OR IGNORE INTO folder_folder (parent, child) VALUES (?, ?)")
        .bind(parent)
        .bind(child.id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Unlinks a folder from a parent. Does not re-add to root.
pub async fn delete_folder_from_folder(
    conn: &mut SqliteConnection,
    child: DbId,
    parent: DbId,
) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM folder_folder WHERE parent = ? AND child = ?")
        .bind(parent)
        .bind(child)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_to_root_if_in_no_folders(
    conn: &mut SqliteConnection,
    folder: DbId,
) -> StoreResult<()> {
    if folder == ROOT_FOLDER_ID {
        return Ok(());
    }
    let count = select_folder_parent_count(conn, folder).await?;
    if count == 0 {
        sqlx::query("INSERT OR IGNORE INTO folder_folder (parent, child) VALUES (?, ?)")
            .bind(ROOT_FOLDER_ID)
            .bind(folder)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn select_folder_parent_count(
    conn: &mut SqliteConnection,
    folder: DbId,
) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM folder_folder WHERE child = ?")
            .bind(folder)
            .fetch_one(&mut *conn)
            .await?,
    )
}

pub async fn select_folder_parents(
    conn: &mut SqliteConnection,
    folder: DbId,
) -> StoreResult<Vec<DbId>> {
    Ok(
        sqlx::query_scalar("SELECT parent FROM folder_folder WHERE child = ? ORDER BY parent")
            .bind(folder)
            .fetch_all(&mut *conn)
            .await?,
    )
}

pub async fn select_folders_in_folder(
    store: &Store,
    conn: &mut SqliteConnection,
    folder: DbId,
    matching_pattern: &str,
) -> StoreResult<Vec<Arc<Folder>>> {
    let ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT vf.id FROM folder_folder ff JOIN virtual_folders vf ON vf.id = ff.child \
         WHERE ff.parent = ? AND vf.deleted = 0 AND vf.name LIKE ? ORDER BY vf.name",
    )
    .bind(folder)
    .bind(format!("%{matching_pattern}%"))
    .fetch_all(&mut *conn)
    .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(child) = select_folder_by_id(store, conn, id).await? {
            result.push(child);
        }
    }
    Ok(result)
}

pub async fn select_folder_by_name_and_parent(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
    parent: DbId,
) -> StoreResult<Option<Arc<Folder>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT vf.id FROM folder_folder ff JOIN virtual_folders vf ON vf.id = ff.child \
         WHERE ff.parent = ? AND vf.name = ? COLLATE NOCASE AND vf.deleted = 0 LIMIT 1",
    )
    .bind(parent)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => select_folder_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

/// First parent of `folder` that already has a child with `name`; used to
/// detect rename conflicts.
pub async fn select_first_parent_with_child_named(
    store: &Store,
    conn: &mut SqliteConnection,
    folder: &Folder,
    name: &str,
) -> StoreResult<Option<Arc<Folder>>> {
    for parent in select_folder_parents(conn, folder.id).await? {
        if let Some(existing) = select_folder_by_name_and_parent(store, conn, name, parent).await? {
            if existing.id != folder.id {
                return select_folder_by_id(store, conn, parent).await;
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "tests/folder_repo_tests.rs"]
mod tests;
