//! Journal rows for reversible user actions.
//!
//! Rows hold the action type discriminant, the performed flag, the JSON
//! payload and a human description. The services layer turns rows back
//! into concrete actions.

use sqlx::SqliteConnection;

use crate::types::models::{now_stamp, DbId};
use crate::types::StoreResult;

const ACTION_COLUMNS: &str =
    "id, type AS action_type, performed, json_data, description, create_time";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionRow {
    pub id: DbId,
    pub action_type: i64,
    pub performed: bool,
    pub json_data: String,
    pub description: String,
    pub create_time: String,
}

pub async fn insert_action(
    conn: &mut SqliteConnection,
    action_type: i64,
    json_data: &str,
    description: &str,
) -> StoreResult<DbId> {
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO actions (type, performed, json_data, description, create_time) \
         VALUES (?, 0, ?, ?, ?) RETURNING id",
    )
    .bind(action_type)
    .bind(json_data)
    .bind(description)
    .bind(now_stamp())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn update_action(
    conn: &mut SqliteConnection,
    id: DbId,
    performed: bool,
    json_data: &str,
    description: &str,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE actions SET performed = ?, json_data = ?, description = ? WHERE id = ?",
    )
    .bind(performed)
    .bind(json_data)
    .bind(description)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_action_performed(
    conn: &mut SqliteConnection,
    id: DbId,
    performed: bool,
) -> StoreResult<()> {
    sqlx::query("UPDATE actions SET performed = ? WHERE id = ?")
        .bind(performed)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn select_action_by_id(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<ActionRow>> {
    Ok(
        sqlx::query_as(&format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub async fn select_oldest_action(
    conn: &mut SqliteConnection,
) -> StoreResult<Option<ActionRow>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions ORDER BY id LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await?)
}

/// Latest actions first, optionally filtered by a search string matched
/// against the payload and description.
pub async fn select_latest_actions(
    conn: &mut SqliteConnection,
    search: &str,
    limit: i64,
) -> StoreResult<Vec<ActionRow>> {
    let like = format!("%{search}%");
    Ok(sqlx::query_as(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions \
         WHERE json_data LIKE ?1 OR description LIKE ?1 ORDER BY id DESC LIMIT ?2"
    ))
    .bind(like)
    .bind(if limit < 0 { i64::MAX } else { limit })
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn delete_action(conn: &mut SqliteConnection, id: DbId) -> StoreResult<()> {
    sqlx::query("DELETE FROM actions WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn count_actions(conn: &mut SqliteConnection) -> StoreResult<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM actions")
        .fetch_one(&mut *conn)
        .await?)
}

/// Actions missing a description, oldest first. Used by maintenance to
/// backfill rows written by older versions.
pub async fn select_actions_without_description(
    conn: &mut SqliteConnection,
) -> StoreResult<Vec<ActionRow>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {ACTION_COLUMNS} FROM actions WHERE description = '' ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?)
}

#[cfg(test)]
#[path = "tests/action_repo_tests.rs"]
mod tests;
