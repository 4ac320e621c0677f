//! Perceptual-hash signature storage in the auxiliary database.
//!
//! Only the storage contract lives here; computing a signature is someone
//! else's job. Signatures are additionally chunked into fixed-length
//! words so candidate duplicates can be found with an index join.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use crate::types::models::DbId;
use crate::types::StoreResult;

/// How many words a signature is chunked into at most.
pub const IMAGE_SIGNATURE_WORD_COUNT: usize = 100;

/// Length of a single signature word.
pub const IMAGE_SIGNATURE_WORD_LENGTH: usize = 10;

/// Stores (or replaces) an image's signature and its word index.
pub async fn insert_signature(
    conn: &mut SqliteConnection,
    image: DbId,
    signature: &str,
) -> StoreResult<()> {
    sqlx::query("INSERT OR REPLACE INTO pictures_signature (picture_id, signature) VALUES (?, ?)")
        .bind(image)
        .bind(signature)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM picture_signature_words WHERE picture_id = ?")
        .bind(image)
        .execute(&mut *conn)
        .await?;

    let bytes = signature.as_bytes();
    let mut index = 0_i64;
    for chunk in bytes.chunks(IMAGE_SIGNATURE_WORD_LENGTH) {
        if index as usize >= IMAGE_SIGNATURE_WORD_COUNT {
            break;
        }
        sqlx::query(
            "INSERT INTO picture_signature_words (picture_id, word_index, sig_word) \
             VALUES (?, ?, ?)",
        )
        .bind(image)
        .bind(index)
        .bind(String::from_utf8_lossy(chunk).to_string())
        .execute(&mut *conn)
        .await?;
        index += 1;
    }

    Ok(())
}

pub async fn select_signature_by_id(
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT signature FROM pictures_signature WHERE picture_id = ?")
            .bind(image)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub async fn delete_signature(conn: &mut SqliteConnection, image: DbId) -> StoreResult<()> {
    sqlx::query("DELETE FROM pictures_signature WHERE picture_id = ?")
        .bind(image)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM picture_signature_words WHERE picture_id = ?")
        .bind(image)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Ids from `live_image_ids` that have no stored signature. The main and
/// signature databases are separate files, so the diff happens here.
pub async fn filter_ids_without_signature(
    conn: &mut SqliteConnection,
    live_image_ids: &[DbId],
) -> StoreResult<Vec<DbId>> {
    let with_signature: Vec<DbId> =
        sqlx::query_scalar("SELECT picture_id FROM pictures_signature")
            .fetch_all(&mut *conn)
            .await?;

    let have: std::collections::HashSet<DbId> = with_signature.into_iter().collect();
    Ok(live_image_ids
        .iter()
        .copied()
        .filter(|id| !have.contains(id))
        .collect())
}

/// Queries the word table for potentially duplicate images.
///
/// Returns original id → list of (duplicate id, strength) where strength
/// is the number of matching words and the lower id is treated as the
/// original.
pub async fn select_potential_duplicates(
    conn: &mut SqliteConnection,
    sensitivity: i64,
) -> StoreResult<HashMap<DbId, Vec<(DbId, i64)>>> {
    let rows: Vec<(DbId, DbId, i64)> = sqlx::query_as(
        "SELECT a.picture_id, b.picture_id, COUNT(*) as strength \
         FROM picture_signature_words a \
         JOIN picture_signature_words b \
           ON a.sig_word = b.sig_word AND a.picture_id < b.picture_id \
         GROUP BY a.picture_id, b.picture_id \
         HAVING strength >= ? \
         ORDER BY a.picture_id",
    )
    .bind(sensitivity)
    .fetch_all(&mut *conn)
    .await?;

    let mut result: HashMap<DbId, Vec<(DbId, i64)>> = HashMap::new();
    for (original, duplicate, strength) in rows {
        result.entry(original).or_default().push((duplicate, strength));
    }
    Ok(result)
}

#[cfg(test)]
#[path = "tests/signature_repo_tests.rs"]
mod tests;
