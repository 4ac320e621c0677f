//! Free-text tag parsing.
//!
//! Turns user strings like "red flower on face" into structured applied
//! tags. The strategies are tried in order; the first that produces a
//! value wins:
//!
//!   1. the whole string as a tag name or alias (super aliases expand and
//!      re-parse),
//!   2. the string with internal whitespace removed,
//!   3. modifier words before (or after) a tag,
//!   4. a composite `left <word> right` where both sides parse,
//!   5. break rules,
//!   6. the string with a trailing `s` stripped.
//!
//! Anything else is an unknown tag.

pub mod suggestions;

use futures::future::BoxFuture;
use sqlx::SqliteConnection;

use crate::database::{tag_repo, Store};
use crate::types::models::{AppliedTagData, TagModifier};
use crate::types::{StoreError, StoreResult};

/// Super-alias expansions and plural stripping re-enter the parser; this
/// bounds runaway definitions.
const MAX_PARSE_DEPTH: u32 = 16;

/// Parses a user string into an applied tag.
pub async fn parse_tag(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
) -> StoreResult<AppliedTagData> {
    parse_tag_from_string(store, conn, input.to_string(), 0).await
}

fn unknown_tag(input: &str) -> StoreError {
    StoreError::InvalidArgument(format!("unknown tag '{input}'"))
}

pub(crate) fn parse_tag_from_string<'a>(
    store: &'a Store,
    conn: &'a mut SqliteConnection,
    input: String,
    depth: u32,
) -> BoxFuture<'a, StoreResult<AppliedTagData>> {
    Box::pin(async move {
        if depth > MAX_PARSE_DEPTH {
            return Err(unknown_tag(&input));
        }

        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(StoreError::InvalidArgument("empty tag string".into()));
        }

        // Exact tag name or alias.
        if let Some(tag) = parse_tag_name(store, conn, &input, depth).await? {
            return Ok(tag);
        }

        // Does removing whitespace create an existing tag?
        let no_whitespace: String = input.chars().filter(|c| *c != ' ').collect();
        if no_whitespace.len() != input.len() {
            if let Some(tag) = parse_tag_name(store, conn, &no_whitespace, depth).await? {
                return Ok(tag);
            }
        }

        // Modifiers before (or after) a tag.
        if let Some(tag) = parse_tag_with_only_modifiers(store, conn, &input, depth).await? {
            return Ok(tag);
        }

        // Composite of two applied tags around a combine word.
        if let Some(tag) = parse_tag_with_composite(store, conn, &input, depth).await? {
            return Ok(tag);
        }

        // A break rule handling the whole string.
        if let Some(broken) = tag_repo::try_break_rules(store, conn, &input).await? {
            if let Some(main_tag) = broken.tag {
                return Ok(AppliedTagData::with_modifiers(main_tag, broken.modifiers));
            }
        }

        // Does stripping a trailing plural-s help?
        if input.len() > 1 && input.ends_with('s') {
            let singular = input[..input.len() - 1].to_string();
            return parse_tag_from_string(store, conn, singular, depth + 1)
                .await
                .map_err(|_| unknown_tag(&input));
        }

        Err(unknown_tag(&input))
    })
}

/// The string as a tag name, alias, or super alias expansion.
async fn parse_tag_name(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
    depth: u32,
) -> StoreResult<Option<AppliedTagData>> {
    if let Some(tag) = tag_repo::select_tag_by_name_or_alias(store, conn, input).await? {
        return Ok(Some(AppliedTagData::simple(tag)));
    }

    let expanded = tag_repo::select_tag_super_alias(conn, input).await?;
    if !expanded.is_empty() {
        return match parse_tag_from_string(store, conn, expanded, depth + 1).await {
            Ok(tag) => Ok(Some(tag)),
            Err(StoreError::InvalidArgument(_)) => Ok(None),
            Err(e) => Err(e),
        };
    }

    Ok(None)
}

/// Resolves every word to a modifier, directly or through a pure-modifier
/// break rule. None when any word fails.
async fn words_as_modifiers(
    store: &Store,
    conn: &mut SqliteConnection,
    words: &[&str],
) -> StoreResult<Option<Vec<TagModifier>>> {
    let mut modifiers = Vec::with_capacity(words.len());

    for word in words {
        if let Some(modifier) = tag_repo::select_tag_modifier_by_name(conn, word).await? {
            modifiers.push(modifier);
            continue;
        }

        // Not a modifier: a break rule may still resolve it, but only a
        // rule that produces modifiers without a tag qualifies here.
        match tag_repo::try_break_rules(store, conn, word).await? {
            Some(broken) if broken.tag.is_none() && !broken.modifiers.is_empty() => {
                modifiers.extend(broken.modifiers);
            }
            _ => return Ok(None),
        }
    }

    Ok(Some(modifiers))
}

/// Tries "modifier(s) then tag" and the symmetric "tag then modifier(s)".
async fn parse_tag_with_only_modifiers(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
    depth: u32,
) -> StoreResult<Option<AppliedTagData>> {
    let words: Vec<&str> = input.split(' ').filter(|w| !w.is_empty()).collect();
    if words.len() < 2 {
        return Ok(None);
    }

    for split in 0..words.len() - 1 {
        let front = &words[..=split];
        let back = &words[split + 1..];

        let back_str = back.join(" ");
        if let Some(tag) = parse_tag_name(store, conn, &back_str, depth).await? {
            if let Some(mut modifiers) = words_as_modifiers(store, conn, front).await? {
                modifiers.extend(tag.modifiers.iter().cloned());
                return Ok(Some(AppliedTagData::with_modifiers(tag.tag, modifiers)));
            }
            continue;
        }

        // Maybe the tag comes first.
        let front_str = front.join(" ");
        if let Some(tag) = parse_tag_name(store, conn, &front_str, depth).await? {
            if let Some(mut modifiers) = words_as_modifiers(store, conn, back).await? {
                modifiers.extend(tag.modifiers.iter().cloned());
                return Ok(Some(AppliedTagData::with_modifiers(tag.tag, modifiers)));
            }
        }
    }

    Ok(None)
}

/// Finds a middle word where both sides parse as applied tags. Any word
/// can act as the combine word.
async fn parse_tag_with_composite(
    store: &Store,
    conn: &mut SqliteConnection,
    input: &str,
    depth: u32,
) -> StoreResult<Option<AppliedTagData>> {
    let words: Vec<&str> = input.split(' ').filter(|w| !w.is_empty()).collect();
    if words.len() < 3 {
        return Ok(None);
    }

    for middle in 1..words.len() - 1 {
        let left_str = words[..middle].join(" ");
        let right_str = words[middle + 1..].join(" ");

        let mut left =
            match parse_tag_from_string(store, conn, left_str, depth + 1).await {
                Ok(tag) => tag,
                Err(StoreError::InvalidArgument(_)) => continue,
                Err(e) => return Err(e),
            };
        let right = match parse_tag_from_string(store, conn, right_str, depth + 1).await {
            Ok(tag) => tag,
            Err(StoreError::InvalidArgument(_)) => continue,
            Err(e) => return Err(e),
        };

        left.set_combine_with(words[middle].to_string(), right);
        return Ok(Some(left));
    }

    Ok(None)
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
