use std::cmp::Ordering;

use super::*;
use crate::database::tag_repo;
use crate::test_utils::{init_test_db, TestContext};
use crate::types::models::TagCategory;

async fn seed_vocabulary(ctx: &TestContext) {
    let mut conn = ctx.store.conn().await.unwrap();

    for name in ["flower", "flowing water", "hair", "face"] {
        tag_repo::insert_tag(
            &ctx.store,
            &mut conn,
            name,
            "",
            TagCategory::DescribeCharacterObject,
            false,
        )
        .await
        .unwrap();
    }

    let flower = tag_repo::select_tag_by_name(&ctx.store, &mut conn, "flower")
        .await
        .unwrap()
        .unwrap();
    tag_repo::insert_tag_alias(&mut conn, flower.id, "floret")
        .await
        .unwrap();

    tag_repo::insert_tag_modifier(&mut conn, "red", "", false)
        .await
        .unwrap();
}

#[test]
fn exact_matches_rank_first() {
    assert_eq!(
        compare_suggestions("flower", "flower", "flowering"),
        Ordering::Less
    );
    assert_eq!(
        compare_suggestions("flower", "flowering", "flower"),
        Ordering::Greater
    );
}

#[test]
fn prefix_matches_rank_before_substring_matches() {
    assert_eq!(
        compare_suggestions("flo", "flower", "sunflower"),
        Ordering::Less
    );
    assert_eq!(
        compare_suggestions("flo", "sunflower", "flower"),
        Ordering::Greater
    );
}

#[test]
fn closer_length_ranks_earlier() {
    // Both are prefix matches; the shorter one is closer to the input.
    assert_eq!(
        compare_suggestions("flo", "flower", "flowering trees"),
        Ordering::Less
    );
}

#[test]
fn falls_back_to_lexicographic_order() {
    assert_eq!(compare_suggestions("x", "apple", "beets"), Ordering::Less);
    assert_eq!(compare_suggestions("x", "beets", "apple"), Ordering::Greater);
}

#[test]
fn comparator_is_strict_weak() {
    let input = "flo";
    let values = ["flower", "floret", "flo", "sunflower", "Flower"];

    for left in values {
        // Irreflexive on equals.
        assert_eq!(compare_suggestions(input, left, left), Ordering::Equal);
        for right in values {
            let forward = compare_suggestions(input, left, right);
            let backward = compare_suggestions(input, right, left);
            assert_eq!(forward, backward.reverse(), "{left} vs {right}");
        }
    }

    // Case variants compare equal rather than flip-flopping.
    assert_eq!(
        compare_suggestions(input, "Flower", "flower"),
        Ordering::Equal
    );
}

#[tokio::test]
async fn partial_input_suggests_matching_names() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let suggestions = get_suggestions(&ctx.store, &mut conn, "flo", 50)
        .await
        .unwrap();

    assert!(suggestions.contains(&"flower".to_string()));
    assert!(suggestions.contains(&"floret".to_string()));
    assert!(suggestions.contains(&"flowing water".to_string()));
    // Everything matching "flo" here is a prefix match.
    assert!(suggestions[0].starts_with("flo"));
}

#[tokio::test]
async fn valid_prefix_is_glued_onto_tail_suggestions() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let suggestions = get_suggestions(&ctx.store, &mut conn, "red flo", 50)
        .await
        .unwrap();

    assert!(suggestions.contains(&"red flower".to_string()));
    assert!(suggestions.iter().all(|s| s.starts_with("red ")));
}

#[tokio::test]
async fn complete_input_suggests_itself() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let suggestions = get_suggestions(&ctx.store, &mut conn, "flower", 50)
        .await
        .unwrap();
    assert_eq!(suggestions.first().map(|s| s.as_str()), Some("flower"));
}

#[tokio::test]
async fn result_count_is_capped() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let suggestions = get_suggestions(&ctx.store, &mut conn, "flo", 2)
        .await
        .unwrap();
    assert!(suggestions.len() <= 2);
}

#[tokio::test]
async fn empty_input_yields_nothing() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let suggestions = get_suggestions(&ctx.store, &mut conn, "   ", 10)
        .await
        .unwrap();
    assert!(suggestions.is_empty());
}
