use super::*;
use crate::database::tag_repo;
use crate::test_utils::{init_test_db, TestContext};
use crate::types::models::TagCategory;

async fn seed_vocabulary(ctx: &TestContext) {
    let mut conn = ctx.store.conn().await.unwrap();

    for name in ["flower", "hair", "face", "uniform"] {
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
    tag_repo::insert_tag_alias(&mut conn, flower.id, "bloom")
        .await
        .unwrap();

    for name in ["red", "long"] {
        tag_repo::insert_tag_modifier(&mut conn, name, "", false)
            .await
            .unwrap();
    }

    let red = tag_repo::select_tag_modifier_by_name(&mut conn, "red")
        .await
        .unwrap()
        .unwrap();
    tag_repo::insert_break_rule(&mut conn, "rose", Some(flower.id), &[red.id])
        .await
        .unwrap();

    tag_repo::insert_tag_super_alias(&mut conn, "rf", "red flower")
        .await
        .unwrap();
}

#[tokio::test]
async fn plain_tag_name_parses() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "Flower").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
    assert!(parsed.modifiers.is_empty());
    assert!(parsed.combined.is_none());
}

#[tokio::test]
async fn alias_parses_to_its_tag() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "bloom").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
}

#[tokio::test]
async fn internal_whitespace_is_stripped_when_needed() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "flo wer").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
}

#[tokio::test]
async fn modifiers_before_the_tag() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "red flower").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
    let modifier_names: Vec<_> = parsed.modifiers.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(modifier_names, vec!["red"]);

    let parsed = parse_tag(&ctx.store, &mut conn, "long red hair")
        .await
        .unwrap();
    assert_eq!(parsed.tag_name(), "hair");
    assert_eq!(parsed.modifiers.len(), 2);
}

#[tokio::test]
async fn tag_before_modifier_also_works() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "hair long").await.unwrap();
    assert_eq!(parsed.tag_name(), "hair");
    assert_eq!(parsed.modifiers[0].name, "long");
}

#[tokio::test]
async fn composites_pick_a_middle_word() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "hair on face").await.unwrap();
    assert_eq!(parsed.tag_name(), "hair");
    let (word, right) = parsed.combined.as_ref().unwrap();
    assert_eq!(word, "on");
    assert_eq!(right.tag_name(), "face");
}

#[tokio::test]
async fn composite_sides_can_carry_modifiers() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "red flower on long hair")
        .await
        .unwrap();
    assert_eq!(parsed.tag_name(), "flower");
    assert_eq!(parsed.modifiers[0].name, "red");
    let (_, right) = parsed.combined.as_ref().unwrap();
    assert_eq!(right.tag_name(), "hair");
    assert_eq!(right.modifiers[0].name, "long");
}

#[tokio::test]
async fn break_rules_resolve_whole_strings() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "rose").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
    assert_eq!(parsed.modifiers[0].name, "red");
}

#[tokio::test]
async fn super_alias_expands_and_reparses() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "rf").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
    assert_eq!(parsed.modifiers[0].name, "red");
}

#[tokio::test]
async fn trailing_plural_s_is_stripped() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let parsed = parse_tag(&ctx.store, &mut conn, "flowers").await.unwrap();
    assert_eq!(parsed.tag_name(), "flower");
}

#[tokio::test]
async fn unknown_strings_fail() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    let result = parse_tag(&ctx.store, &mut conn, "no such thing").await;
    match result {
        Err(crate::types::StoreError::InvalidArgument(message)) => {
            assert!(message.contains("unknown tag"));
        }
        other => panic!("expected unknown tag error, got {other:?}"),
    }

    let result = parse_tag(&ctx.store, &mut conn, "   ").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn accurate_strings_round_trip() {
    let ctx = init_test_db().await;
    seed_vocabulary(&ctx).await;
    let mut conn = ctx.store.conn().await.unwrap();

    for input in [
        "flower",
        "red flower",
        "long red hair",
        "hair on face",
        "red flower on long hair",
    ] {
        let parsed = parse_tag(&ctx.store, &mut conn, input).await.unwrap();
        let text = parsed.to_accurate_string();
        let reparsed = parse_tag(&ctx.store, &mut conn, &text).await.unwrap();
        assert!(
            parsed.is_same(&reparsed),
            "round trip changed meaning for '{input}' via '{text}'"
        );
    }
}
