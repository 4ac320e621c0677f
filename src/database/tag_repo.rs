//! Tag vocabulary: tags, aliases, implications, modifiers, break rules,
//! super aliases and the deduplicated applied-tag storage.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::info;
use sqlx::SqliteConnection;

use crate::database::Store;
use crate::types::models::{
    AppliedTagData, BrokenTag, DbId, Tag, TagBreakRule, TagCategory, TagModifier, TagRow,
};
use crate::types::{StoreError, StoreResult};

const TAG_COLUMNS: &str = "id, name, category, description, is_private, deleted";
const MODIFIER_COLUMNS: &str = "id, name, description, is_private, deleted";

// ─── Tags ─────────────────────────────────────────────────────────

pub async fn insert_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
    description: &str,
    category: TagCategory,
    is_private: bool,
) -> StoreResult<Arc<Tag>> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(StoreError::InvalidArgument("tag name may not be empty".into()));
    }
    if select_tag_by_name(store, conn, &name).await?.is_some() {
        return Err(StoreError::InvalidArgument(format!(
            "tag name is already in use: {name}"
        )));
    }

    let id: DbId = sqlx::query_scalar(
        "INSERT INTO tags (name, category, description, is_private) VALUES (?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(&name)
    .bind(category as i64)
    .bind(description)
    .bind(is_private)
    .fetch_one(&mut *conn)
    .await?;

    let row = TagRow {
        id,
        name,
        category: category as i64,
        description: description.to_string(),
        is_private,
        deleted: false,
    };
    Ok(store.loaded_tags.resolve(id, || Tag::from_row(row)))
}

pub async fn select_tag_by_id(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<Arc<Tag>>> {
    if let Some(existing) = store.loaded_tags.get_if_loaded(id) {
        return Ok(Some(existing));
    }

    let row: Option<TagRow> =
        sqlx::query_as(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|row| store.loaded_tags.resolve(id, || Tag::from_row(row))))
}

pub async fn select_tag_by_name(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
) -> StoreResult<Option<Arc<Tag>>> {
    let id: Option<DbId> =
        sqlx::query_scalar("SELECT id FROM tags WHERE LOWER(name) = LOWER(?) AND deleted = 0")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    match id {
        Some(id) => select_tag_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_tag_by_alias(
    store: &Store,
    conn: &mut SqliteConnection,
    alias: &str,
) -> StoreResult<Option<Arc<Tag>>> {
    let id: Option<DbId> = sqlx::query_scalar(
        "SELECT t.id FROM tag_aliases a JOIN tags t ON t.id = a.meant_tag \
         WHERE LOWER(a.name) = LOWER(?) AND t.deleted = 0",
    )
    .bind(alias)
    .fetch_optional(&mut *conn)
    .await?;

    match id {
        Some(id) => select_tag_by_id(store, conn, id).await,
        None => Ok(None),
    }
}

pub async fn select_tag_by_name_or_alias(
    store: &Store,
    conn: &mut SqliteConnection,
    name: &str,
) -> StoreResult<Option<Arc<Tag>>> {
    if let Some(tag) = select_tag_by_name(store, conn, name).await? {
        return Ok(Some(tag));
    }
    select_tag_by_alias(store, conn, name).await
}

pub async fn update_tag(conn: &mut SqliteConnection, tag: &Tag) -> StoreResult<()> {
    let row = tag.row();
    sqlx::query(
        "UPDATE tags SET name = ?, category = ?, description = ?, is_private = ?, deleted = ? \
         WHERE id = ?",
    )
    .bind(&row.name)
    .bind(row.category)
    .bind(&row.description)
    .bind(row.is_private)
    .bind(row.deleted)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Union of direct name matches and alias matches, capped. Direct
/// matches come first.
pub async fn select_tags_wildcard(
    store: &Store,
    conn: &mut SqliteConnection,
    pattern: &str,
    max: i64,
    include_aliases: bool,
) -> StoreResult<Vec<Arc<Tag>>> {
    let like = format!("%{pattern}%");

    let mut ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT id FROM tags WHERE name LIKE ? AND deleted = 0 ORDER BY name LIMIT ?",
    )
    .bind(&like)
    .bind(max)
    .fetch_all(&mut *conn)
    .await?;

    if include_aliases && (ids.len() as i64) < max {
        let alias_ids: Vec<DbId> = sqlx::query_scalar(
            "SELECT t.id FROM tag_aliases a JOIN tags t ON t.id = a.meant_tag \
             WHERE a.name LIKE ? AND t.deleted = 0 ORDER BY a.name LIMIT ?",
        )
        .bind(&like)
        .bind(max - ids.len() as i64)
        .fetch_all(&mut *conn)
        .await?;

        for id in alias_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = select_tag_by_id(store, conn, id).await? {
            result.push(tag);
        }
    }
    Ok(result)
}

// ─── Aliases, implications, super aliases ─────────────────────────

/// Returns false when the alias name is already taken.
pub async fn insert_tag_alias(
    conn: &mut SqliteConnection,
    tag: DbId,
    alias: &str,
) -> StoreResult<bool> {
    let alias = alias.trim().to_lowercase();
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM tag_aliases WHERE LOWER(name) = ? LIMIT 1")
            .bind(&alias)
            .fetch_optional(&mut *conn)
            .await?;
    if existing.is_some() {
        return Ok(false);
    }

    sqlx::query("INSERT INTO tag_aliases (name, meant_tag) VALUES (?, ?)")
        .bind(&alias)
        .bind(tag)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

pub async fn delete_tag_alias(conn: &mut SqliteConnection, alias: &str) -> StoreResult<()> {
    sqlx::query("DELETE FROM tag_aliases WHERE LOWER(name) = LOWER(?)")
        .bind(alias)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn select_tag_aliases(
    conn: &mut SqliteConnection,
    tag: DbId,
) -> StoreResult<Vec<String>> {
    Ok(
        sqlx::query_scalar("SELECT name FROM tag_aliases WHERE meant_tag = ? ORDER BY name")
            .bind(tag)
            .fetch_all(&mut *conn)
            .await?,
    )
}

/// Records "applying `tag` implies `implied`". False when already present.
pub async fn insert_tag_imply(
    conn: &mut SqliteConnection,
    tag: DbId,
    implied: DbId,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO tag_implies (primary_tag, to_apply) VALUES (?, ?)",
    )
    .bind(tag)
    .bind(implied)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_tag_imply(
    conn: &mut SqliteConnection,
    tag: DbId,
    implied: DbId,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM tag_implies WHERE primary_tag = ? AND to_apply = ?")
        .bind(tag)
        .bind(implied)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn select_tag_implies(
    conn: &mut SqliteConnection,
    tag: DbId,
) -> StoreResult<Vec<DbId>> {
    Ok(
        sqlx::query_scalar("SELECT to_apply FROM tag_implies WHERE primary_tag = ?")
            .bind(tag)
            .fetch_all(&mut *conn)
            .await?,
    )
}

pub async fn select_tag_implies_as_tags(
    store: &Store,
    conn: &mut SqliteConnection,
    tag: DbId,
) -> StoreResult<Vec<Arc<Tag>>> {
    let ids = select_tag_implies(conn, tag).await?;
    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = select_tag_by_id(store, conn, id).await? {
            result.push(tag);
        }
    }
    Ok(result)
}

/// Expansion text of a super alias, empty when none.
pub async fn select_tag_super_alias(
    conn: &mut SqliteConnection,
    name: &str,
) -> StoreResult<String> {
    let expanded: Option<String> =
        sqlx::query_scalar("SELECT expanded FROM tag_super_aliases WHERE LOWER(alias) = LOWER(?)")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(expanded.unwrap_or_default())
}

pub async fn insert_tag_super_alias(
    conn: &mut SqliteConnection,
    alias: &str,
    expanded: &str,
) -> StoreResult<()> {
    sqlx::query("INSERT INTO tag_super_aliases (alias, expanded) VALUES (?, ?)")
        .bind(alias.trim().to_lowercase())
        .bind(expanded)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ─── Modifiers ────────────────────────────────────────────────────

pub async fn insert_tag_modifier(
    conn: &mut SqliteConnection,
    name: &str,
    description: &str,
    is_private: bool,
) -> StoreResult<TagModifier> {
    let name = name.trim().to_lowercase();
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO tag_modifiers (name, description, is_private) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(&name)
    .bind(description)
    .bind(is_private)
    .fetch_one(&mut *conn)
    .await?;

    Ok(TagModifier {
        id,
        name,
        description: description.to_string(),
        is_private,
        deleted: false,
    })
}

pub async fn select_tag_modifier_by_id(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<Option<TagModifier>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {MODIFIER_COLUMNS} FROM tag_modifiers WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn select_tag_modifier_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> StoreResult<Option<TagModifier>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {MODIFIER_COLUMNS} FROM tag_modifiers \
         WHERE LOWER(name) = LOWER(?) AND deleted = 0"
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn update_tag_modifier(
    conn: &mut SqliteConnection,
    modifier: &TagModifier,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE tag_modifiers SET name = ?, description = ?, is_private = ?, deleted = ? \
         WHERE id = ?",
    )
    .bind(&modifier.name)
    .bind(&modifier.description)
    .bind(modifier.is_private)
    .bind(modifier.deleted)
    .bind(modifier.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ─── Break rules ──────────────────────────────────────────────────

pub async fn insert_break_rule(
    conn: &mut SqliteConnection,
    pattern: &str,
    actual_tag: Option<DbId>,
    modifiers: &[DbId],
) -> StoreResult<DbId> {
    let id: DbId = sqlx::query_scalar(
        "INSERT INTO common_composite_tags (tag_string, actual_tag) VALUES (?, ?) RETURNING id",
    )
    .bind(pattern.trim().to_lowercase())
    .bind(actual_tag)
    .fetch_one(&mut *conn)
    .await?;

    for modifier in modifiers {
        sqlx::query("INSERT INTO composite_tag_modifiers (composite, modifier) VALUES (?, ?)")
            .bind(id)
            .bind(modifier)
            .execute(&mut *conn)
            .await?;
    }
    Ok(id)
}

async fn load_break_rule(
    store: &Store,
    conn: &mut SqliteConnection,
    id: DbId,
    pattern: String,
    actual_tag: Option<DbId>,
) -> StoreResult<TagBreakRule> {
    let tag = match actual_tag {
        Some(tag_id) => select_tag_by_id(store, conn, tag_id).await?,
        None => None,
    };

    let modifier_ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT modifier FROM composite_tag_modifiers WHERE composite = ? ORDER BY modifier",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let mut modifiers = Vec::with_capacity(modifier_ids.len());
    for modifier_id in modifier_ids {
        if let Some(modifier) = select_tag_modifier_by_id(conn, modifier_id).await? {
            modifiers.push(modifier);
        }
    }

    Ok(TagBreakRule {
        id,
        pattern,
        actual_tag: tag,
        modifiers,
    })
}

/// Finds a break rule that can handle the string: an exact-pattern rule
/// or any wildcard rule whose literal part matches.
pub async fn select_break_rule_by_str(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
) -> StoreResult<Option<TagBreakRule>> {
    let candidates: Vec<(DbId, String, Option<DbId>)> = sqlx::query_as(
        "SELECT id, tag_string, actual_tag FROM common_composite_tags \
         WHERE LOWER(tag_string) = LOWER(?) OR tag_string LIKE '%*%' ORDER BY id",
    )
    .bind(input)
    .fetch_all(&mut *conn)
    .await?;

    for (id, pattern, actual_tag) in candidates {
        let rule = load_break_rule(store, conn, id, pattern, actual_tag).await?;
        if rule.do_break(input).is_some() {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

/// Applies the first matching break rule.
pub async fn try_break_rules(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
) -> StoreResult<Option<BrokenTag>> {
    match select_break_rule_by_str(store, conn, input).await? {
        Some(rule) => Ok(rule.do_break(input)),
        None => Ok(None),
    }
}

// ─── Wildcard helpers for suggestions ─────────────────────────────

pub async fn select_tag_names_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT name FROM tags WHERE name LIKE ? AND deleted = 0 ORDER BY name LIMIT 100",
    )
    .bind(format!("%{pattern}%"))
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn select_tag_aliases_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT name FROM tag_aliases WHERE name LIKE ? ORDER BY name LIMIT 100",
    )
    .bind(format!("%{pattern}%"))
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn select_tag_modifier_names_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT name FROM tag_modifiers WHERE name LIKE ? AND deleted = 0 ORDER BY name LIMIT 100",
    )
    .bind(format!("%{pattern}%"))
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn select_break_rules_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT tag_string FROM common_composite_tags WHERE tag_string LIKE ? \
         ORDER BY tag_string LIMIT 100",
    )
    .bind(format!("%{pattern}%"))
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn select_tag_super_alias_wildcard(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT alias FROM tag_super_aliases WHERE alias LIKE ? ORDER BY alias LIMIT 100",
    )
    .bind(format!("%{pattern}%"))
    .fetch_all(&mut *conn)
    .await?)
}

// ─── Applied tags ─────────────────────────────────────────────────

pub fn select_applied_tag_by_id<'a>(
    store: &'a Store,
    conn: &'a mut SqliteConnection,
    id: DbId,
) -> BoxFuture<'a, StoreResult<Option<AppliedTagData>>> {
    Box::pin(async move {
        let tag_id: Option<DbId> = sqlx::query_scalar("SELECT tag FROM applied_tag WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(tag_id) = tag_id else {
            return Ok(None);
        };
        let Some(tag) = select_tag_by_id(store, conn, tag_id).await? else {
            return Ok(None);
        };

        let modifiers = select_applied_tag_modifiers(conn, id).await?;

        let combine: Option<(DbId, String)> = sqlx::query_as(
            "SELECT tag_right, combined_with FROM applied_tag_combine WHERE tag_left = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let mut data = AppliedTagData::with_modifiers(tag, modifiers);
        if let Some((right_id, word)) = combine {
            if let Some(right) = select_applied_tag_by_id(store, conn, right_id).await? {
                data.set_combine_with(word, right);
            }
        }

        Ok(Some(data))
    })
}

pub async fn select_applied_tag_modifiers(
    conn: &mut SqliteConnection,
    applied_tag: DbId,
) -> StoreResult<Vec<TagModifier>> {
    Ok(sqlx::query_as(
        "SELECT m.id, m.name, m.description, m.is_private, m.deleted \
         FROM applied_tag_modifier am JOIN tag_modifiers m ON m.id = am.modifier \
         WHERE am.to_tag = ? ORDER BY m.name",
    )
    .bind(applied_tag)
    .fetch_all(&mut *conn)
    .await?)
}

async fn check_applied_tag_modifiers_match(
    conn: &mut SqliteConnection,
    id: DbId,
    tag: &AppliedTagData,
) -> StoreResult<bool> {
    let stored = select_applied_tag_modifiers(conn, id).await?;
    if stored.len() != tag.modifiers.len() {
        return Ok(false);
    }

    let mut wanted: Vec<&str> = tag.modifiers.iter().map(|m| m.name.as_str()).collect();
    wanted.sort_unstable();
    let mut have: Vec<&str> = stored.iter().map(|m| m.name.as_str()).collect();
    have.sort_unstable();
    Ok(wanted == have)
}

fn check_applied_tag_combines_match<'a>(
    store: &'a Store,
    conn: &'a mut SqliteConnection,
    id: DbId,
    tag: &'a AppliedTagData,
) -> BoxFuture<'a, StoreResult<bool>> {
    Box::pin(async move {
        let combine: Option<(DbId, String)> = sqlx::query_as(
            "SELECT tag_right, combined_with FROM applied_tag_combine WHERE tag_left = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match (&tag.combined, combine) {
            (None, None) => Ok(true),
            (Some((word, right)), Some((right_id, stored_word))) => {
                if *word != stored_word {
                    return Ok(false);
                }
                match select_applied_tag_by_id(store, conn, right_id).await? {
                    Some(stored_right) => Ok(stored_right.is_same(right)),
                    None => Ok(false),
                }
            }
            _ => Ok(false),
        }
    })
}

/// Id of an existing applied tag with identical main tag, modifier set
/// and combined-with content.
pub async fn select_existing_applied_tag_id(
    store: &Store,
    conn: &mut SqliteConnection,
    tag: &AppliedTagData,
) -> StoreResult<Option<DbId>> {
    let candidates: Vec<DbId> =
        sqlx::query_scalar("SELECT id FROM applied_tag WHERE tag = ? ORDER BY id")
            .bind(tag.tag.id)
            .fetch_all(&mut *conn)
            .await?;

    for candidate in candidates {
        if !check_applied_tag_modifiers_match(conn, candidate, tag).await? {
            continue;
        }
        if check_applied_tag_combines_match(store, conn, candidate, tag).await? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Inserts an applied tag, reusing an existing identical row when there
/// is one. Returns the row id either way.
pub fn insert_applied_tag<'a>(
    store: &'a Store,
    conn: &'a mut SqliteConnection,
    tag: &'a AppliedTagData,
) -> BoxFuture<'a, StoreResult<DbId>> {
    Box::pin(async move {
        if let Some(existing) = select_existing_applied_tag_id(store, conn, tag).await? {
            return Ok(existing);
        }

        let id: DbId = sqlx::query_scalar("INSERT INTO applied_tag (tag) VALUES (?) RETURNING id")
            .bind(tag.tag.id)
            .fetch_one(&mut *conn)
            .await?;

        for modifier in &tag.modifiers {
            sqlx::query(
                "INSERT OR IGNORE INTO applied_tag_modifier (to_tag, modifier) VALUES (?, ?)",
            )
            .bind(id)
            .bind(modifier.id)
            .execute(&mut *conn)
            .await?;
        }

        if let Some((word, right)) = &tag.combined {
            let right_id = insert_applied_tag(store, conn, right).await?;
            sqlx::query(
                "INSERT INTO applied_tag_combine (tag_left, tag_right, combined_with) \
                 VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(right_id)
            .bind(word)
            .execute(&mut *conn)
            .await?;
        }

        Ok(id)
    })
}

pub async fn select_is_applied_tag_used(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<bool> {
    let used: Option<i64> = sqlx::query_scalar(
        "SELECT 1 WHERE EXISTS (SELECT 1 FROM image_tag WHERE tag = ?1) \
         OR EXISTS (SELECT 1 FROM collection_tag WHERE tag = ?1) \
         OR EXISTS (SELECT 1 FROM applied_tag_combine WHERE tag_left = ?1 OR tag_right = ?1)",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(used.is_some())
}

pub async fn delete_applied_tag_if_not_used(
    conn: &mut SqliteConnection,
    id: DbId,
) -> StoreResult<bool> {
    if select_is_applied_tag_used(conn, id).await? {
        return Ok(false);
    }
    sqlx::query("DELETE FROM applied_tag WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Rewrites every reference of `second` to `first` and drops the
/// redundant row.
pub async fn combine_applied_tag_duplicate(
    conn: &mut SqliteConnection,
    first: DbId,
    second: DbId,
) -> StoreResult<()> {
    sqlx::query("UPDATE OR IGNORE image_tag SET tag = ? WHERE tag = ?")
        .bind(first)
        .bind(second)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM image_tag WHERE tag = ?")
        .bind(second)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE OR IGNORE collection_tag SET tag = ? WHERE tag = ?")
        .bind(first)
        .bind(second)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM collection_tag WHERE tag = ?")
        .bind(second)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE OR IGNORE applied_tag_combine SET tag_left = ? WHERE tag_left = ?")
        .bind(first)
        .bind(second)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM applied_tag_combine WHERE tag_left = ?")
        .bind(second)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE OR IGNORE applied_tag_combine SET tag_right = ? WHERE tag_right = ?")
        .bind(first)
        .bind(second)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM applied_tag_combine WHERE tag_right = ?")
        .bind(second)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM applied_tag WHERE id = ?")
        .bind(second)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AppliedTagKey {
    tag: DbId,
    modifiers: Vec<DbId>,
    combine: Option<(DbId, String)>,
}

/// Scans all applied tags and merges duplicates. Merging can create new
/// duplicates (combine right sides collapsing), so the pass repeats until
/// stable. Returns the number of merged rows.
pub async fn coalesce_applied_tags(conn: &mut SqliteConnection) -> StoreResult<u64> {
    let mut total_merged = 0_u64;

    loop {
        let ids: Vec<DbId> = sqlx::query_scalar("SELECT id FROM applied_tag ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

        let mut seen: HashMap<AppliedTagKey, DbId> = HashMap::new();
        let mut merges: Vec<(DbId, DbId)> = Vec::new();

        for id in ids {
            let tag: DbId = sqlx::query_scalar("SELECT tag FROM applied_tag WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
            let mut modifiers: Vec<DbId> = sqlx::query_scalar(
                "SELECT modifier FROM applied_tag_modifier WHERE to_tag = ?",
            )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
            modifiers.sort_unstable();

            let combine: Option<(DbId, String)> = sqlx::query_as(
                "SELECT tag_right, combined_with FROM applied_tag_combine \
                 WHERE tag_left = ? LIMIT 1",
            )
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

            let key = AppliedTagKey {
                tag,
                modifiers,
                combine,
            };
            match seen.get(&key) {
                Some(&keep) => merges.push((keep, id)),
                None => {
                    seen.insert(key, id);
                }
            }
        }

        if merges.is_empty() {
            break;
        }

        for (keep, duplicate) in &merges {
            combine_applied_tag_duplicate(conn, *keep, *duplicate).await?;
        }
        total_merged += merges.len() as u64;
    }

    if total_merged > 0 {
        info!("Coalesced {total_merged} duplicate applied tags");
    }
    Ok(total_merged)
}

pub async fn count_applied_tags(conn: &mut SqliteConnection) -> StoreResult<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM applied_tag")
        .fetch_one(&mut *conn)
        .await?)
}

pub async fn count_existing_tags(conn: &mut SqliteConnection) -> StoreResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE deleted = 0")
            .fetch_one(&mut *conn)
            .await?,
    )
}

// ─── Image and collection tag links ───────────────────────────────

pub async fn select_image_tags(
    store: &Store,
    conn: &mut SqliteConnection,
    image: DbId,
) -> StoreResult<Vec<AppliedTagData>> {
    let ids: Vec<DbId> =
        sqlx::query_scalar("SELECT tag FROM image_tag WHERE image = ? ORDER BY tag")
            .bind(image)
            .fetch_all(&mut *conn)
            .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = select_applied_tag_by_id(store, conn, id).await? {
            result.push(tag);
        }
    }
    Ok(result)
}

pub async fn insert_image_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    image: DbId,
    tag: &AppliedTagData,
) -> StoreResult<DbId> {
    let applied = insert_applied_tag(store, conn, tag).await?;
    sqlx::query("INSERT OR IGNORE INTO image_tag (image, tag) VALUES (?, ?)")
        .bind(image)
        .bind(applied)
        .execute(&mut *conn)
        .await?;
    Ok(applied)
}

pub async fn delete_image_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    image: DbId,
    tag: &AppliedTagData,
) -> StoreResult<bool> {
    let Some(applied) = select_existing_applied_tag_id(store, conn, tag).await? else {
        return Ok(false);
    };

    let result = sqlx::query("DELETE FROM image_tag WHERE image = ? AND tag = ?")
        .bind(image)
        .bind(applied)
        .execute(&mut *conn)
        .await?;

    delete_applied_tag_if_not_used(conn, applied).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn select_collection_tags(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
) -> StoreResult<Vec<AppliedTagData>> {
    let ids: Vec<DbId> =
        sqlx::query_scalar("SELECT tag FROM collection_tag WHERE collection = ? ORDER BY tag")
            .bind(collection)
            .fetch_all(&mut *conn)
            .await?;

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = select_applied_tag_by_id(store, conn, id).await? {
            result.push(tag);
        }
    }
    Ok(result)
}

pub async fn insert_collection_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    tag: &AppliedTagData,
) -> StoreResult<DbId> {
    let applied = insert_applied_tag(store, conn, tag).await?;
    sqlx::query("INSERT OR IGNORE INTO collection_tag (collection, tag) VALUES (?, ?)")
        .bind(collection)
        .bind(applied)
        .execute(&mut *conn)
        .await?;
    Ok(applied)
}

pub async fn delete_collection_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    collection: DbId,
    tag: &AppliedTagData,
) -> StoreResult<bool> {
    let Some(applied) = select_existing_applied_tag_id(store, conn, tag).await? else {
        return Ok(false);
    };

    let result = sqlx::query("DELETE FROM collection_tag WHERE collection = ? AND tag = ?")
        .bind(collection)
        .bind(applied)
        .execute(&mut *conn)
        .await?;

    delete_applied_tag_if_not_used(conn, applied).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
#[path = "tests/tag_repo_tests.rs"]
mod tests;
