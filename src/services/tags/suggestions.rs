//! Completion suggestions for partially typed tag strings.

use std::cmp::Ordering;

use futures::future::BoxFuture;
use log::warn;
use sqlx::SqliteConnection;

use crate::database::{tag_repo, Store};
use crate::services::tags::parse_tag_from_string;
use crate::types::StoreResult;

/// Total order for ranking suggestions against the user's input: exact
/// matches first, then prefix matches, then closest in length, falling
/// back to case-insensitive lexicographic order. Equal strings compare
/// equal, which keeps the order strict-weak.
pub fn compare_suggestions(input: &str, left: &str, right: &str) -> Ordering {
    let left_lower = left.to_lowercase();
    let right_lower = right.to_lowercase();

    if left_lower == right_lower {
        return Ordering::Equal;
    }

    let left_exact = left_lower == input;
    let right_exact = right_lower == input;
    if left_exact != right_exact {
        return if left_exact { Ordering::Less } else { Ordering::Greater };
    }

    let left_prefix = left_lower.starts_with(input);
    let right_prefix = right_lower.starts_with(input);
    if left_prefix != right_prefix {
        return if left_prefix { Ordering::Less } else { Ordering::Greater };
    }

    let input_len = input.len() as i64;
    let left_distance = (left_lower.len() as i64 - input_len).abs();
    let right_distance = (right_lower.len() as i64 - input_len).abs();
    match left_distance.cmp(&right_distance) {
        Ordering::Equal => left_lower.cmp(&right_lower),
        other => other,
    }
}

pub fn sort_suggestions(result: &mut [String], input: &str) {
    result.sort_by(|left, right| compare_suggestions(input, left, right));
}

/// Wildcard matches over every tag-ish namespace: names, aliases,
/// modifier names, break-rule patterns and super aliases.
async fn retrieve_tags_matching(
    conn: &mut SqliteConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    let mut result = tag_repo::select_tag_names_wildcard(conn, pattern).await?;
    result.extend(tag_repo::select_tag_aliases_wildcard(conn, pattern).await?);
    result.extend(tag_repo::select_tag_modifier_names_wildcard(conn, pattern).await?);
    result.extend(tag_repo::select_break_rules_wildcard(conn, pattern).await?);
    result.extend(tag_repo::select_tag_super_alias_wildcard(conn, pattern).await?);
    Ok(result)
}

/// Suggestions for a partial tag string.
///
/// The valid token prefix is lexed off first; wildcard matches for the
/// unparsed tail get the prefix glued back on, and the tail's tail is
/// recursed on for composite completions.
pub fn get_suggestions<'a>(
    store: &'a Store,
    conn: &'a mut SqliteConnection,
    input: &str,
    max_count: usize,
) -> BoxFuture<'a, StoreResult<Vec<String>>> {
    let input = input.trim().to_lowercase();
    Box::pin(async move {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut result: Vec<String> = Vec::new();

        // Consume valid parts from the front. A tag blocks further tags
        // until a modifier or rule re-opens the position.
        let mut prefix = String::new();
        let mut current_part = String::new();
        let mut tag_allowed = true;
        let mut modifier_allowed = true;

        for word in input.split(' ').filter(|w| !w.is_empty()) {
            if current_part.is_empty() {
                current_part.push_str(word);
            } else {
                current_part.push(' ');
                current_part.push_str(word);
            }

            let mut valid = false;

            if tag_allowed
                && tag_repo::select_tag_by_name_or_alias(store, conn, &current_part)
                    .await?
                    .is_some()
            {
                tag_allowed = false;
                modifier_allowed = false;
                valid = true;
            }

            if !valid
                && modifier_allowed
                && tag_repo::select_tag_modifier_by_name(conn, &current_part)
                    .await?
                    .is_some()
            {
                modifier_allowed = false;
                tag_allowed = true;
                valid = true;
            }

            if !valid
                && tag_repo::try_break_rules(store, conn, &current_part)
                    .await?
                    .is_some()
            {
                modifier_allowed = false;
                tag_allowed = true;
                valid = true;
            }

            if !valid
                && !tag_repo::select_tag_super_alias(conn, &current_part)
                    .await?
                    .is_empty()
            {
                modifier_allowed = false;
                tag_allowed = true;
                valid = true;
            }

            if valid {
                if !prefix.is_empty() {
                    prefix.push(' ');
                }
                prefix.push_str(&current_part);
                current_part.clear();
            }
        }

        if !prefix.is_empty() {
            prefix.push(' ');
        }

        if current_part.is_empty() {
            // The whole input should parse; double-check before
            // suggesting it verbatim.
            match parse_tag_from_string(store, conn, input.clone(), 0).await {
                Ok(_) => result.push(input.clone()),
                Err(_) => {
                    warn!("Suggestions thought \"{input}\" would be a valid tag but it isn't");
                }
            }

            // Longer tags that start the same way.
            result.extend(retrieve_tags_matching(conn, &input).await?);
        } else {
            let mut found_exact_prefix = false;

            for matched in retrieve_tags_matching(conn, &current_part).await? {
                if !found_exact_prefix && matched.starts_with(&current_part) {
                    found_exact_prefix = true;
                }
                result.push(format!("{prefix}{matched}"));
            }

            // Composite completions from the tail, unless the tail's head
            // was really the start of a multiword tag.
            if let Some(space) = current_part.find(' ') {
                if !found_exact_prefix {
                    let (head, tail) = current_part.split_at(space + 1);
                    let tail_prefix = format!("{prefix}{head}");
                    let remaining = (max_count.saturating_sub(result.len())).max(max_count / 4);

                    for matched in get_suggestions(store, &mut *conn, tail, remaining).await? {
                        result.push(format!("{tail_prefix}{matched}"));
                    }
                }
            }
        }

        sort_suggestions(&mut result, &input);
        result.dedup();
        result.truncate(max_count);

        Ok(result)
    })
}

#[cfg(test)]
#[path = "tests/suggestions_tests.rs"]
mod tests;
