use std::sync::Arc;

use super::*;
use crate::test_utils::{init_test_db, insert_test_image};

#[tokio::test]
async fn insert_and_select_by_id() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "hash_a").await;

    let mut conn = ctx.store.conn().await.unwrap();
    let loaded = select_image_by_id(&ctx.store, &mut conn, image.id)
        .await
        .unwrap()
        .expect("image should exist");

    assert_eq!(loaded.name(), "first");
    assert_eq!(loaded.file_hash(), "hash_a");
}

#[tokio::test]
async fn select_by_id_returns_the_same_object() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "hash_a").await;

    let mut conn = ctx.store.conn().await.unwrap();
    let first = select_image_by_id(&ctx.store, &mut conn, image.id)
        .await
        .unwrap()
        .unwrap();
    let second = select_image_by_id(&ctx.store, &mut conn, image.id)
        .await
        .unwrap()
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &image));
}

#[tokio::test]
async fn insert_requires_a_hash() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let result = insert_image(
        &ctx.store,
        &mut conn,
        &NewImage {
            relative_path: ":?ocl/collections/test/x.jpg".into(),
            width: 1,
            height: 1,
            name: "x".into(),
            extension: ".jpg".into(),
            is_private: false,
            from_file: String::new(),
            file_hash: String::new(),
        },
    )
    .await;

    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn duplicate_hash_is_rejected_for_live_images() {
    let ctx = init_test_db().await;
    insert_test_image(&ctx.store, "first", "same_hash").await;

    let mut conn = ctx.store.conn().await.unwrap();
    let result = insert_image(
        &ctx.store,
        &mut conn,
        &NewImage {
            relative_path: ":?ocl/collections/test/dup.jpg".into(),
            width: 1,
            height: 1,
            name: "dup".into(),
            extension: ".jpg".into(),
            is_private: false,
            from_file: String::new(),
            file_hash: "same_hash".into(),
        },
    )
    .await;

    assert!(matches!(result, Err(StoreError::Sql { .. })));
}

#[tokio::test]
async fn soft_deleted_image_frees_its_hash() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "reused_hash").await;

    let mut conn = ctx.store.conn().await.unwrap();
    set_image_deleted(&ctx.store, &mut conn, image.id, true)
        .await
        .unwrap();
    assert!(image.is_deleted());

    // Hash lookups skip deleted rows...
    let by_hash = select_image_by_hash(&ctx.store, &mut conn, "reused_hash")
        .await
        .unwrap();
    assert!(by_hash.is_none());

    // ...and a new image may take the hash over.
    let replacement = insert_image(
        &ctx.store,
        &mut conn,
        &NewImage {
            relative_path: ":?ocl/collections/test/again.jpg".into(),
            width: 1,
            height: 1,
            name: "again".into(),
            extension: ".jpg".into(),
            is_private: false,
            from_file: String::new(),
            file_hash: "reused_hash".into(),
        },
    )
    .await;
    assert!(replacement.is_ok());
}

#[tokio::test]
async fn skip_deleted_variant_filters() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "hash_a").await;

    let mut conn = ctx.store.conn().await.unwrap();
    set_image_deleted(&ctx.store, &mut conn, image.id, true)
        .await
        .unwrap();

    let plain = select_image_by_id(&ctx.store, &mut conn, image.id)
        .await
        .unwrap();
    let skipping = select_image_by_id_skip_deleted(&ctx.store, &mut conn, image.id)
        .await
        .unwrap();
    assert!(plain.is_some());
    assert!(skipping.is_none());
}

#[tokio::test]
async fn purge_removes_row_and_rewrites_path() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "hash_a").await;
    let id = image.id;

    let mut conn = ctx.store.conn().await.unwrap();
    purge_images(&ctx.store, &mut conn, &[id]).await.unwrap();

    assert_eq!(image.relative_path(), "[deleted]");
    let gone = select_image_by_id(&ctx.store, &mut conn, id).await.unwrap();
    assert!(gone.is_none() || !Arc::ptr_eq(&gone.unwrap(), &image));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pictures WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn update_image_persists_entity_changes() {
    let ctx = init_test_db().await;
    let image = insert_test_image(&ctx.store, "first", "hash_a").await;

    image.set_relative_path(":?scl/collections/moved/first.jpg".into());
    let mut conn = ctx.store.conn().await.unwrap();
    update_image(&mut conn, &image).await.unwrap();

    let stored: String = sqlx::query_scalar("SELECT relative_path FROM pictures WHERE id = ?")
        .bind(image.id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(stored, ":?scl/collections/moved/first.jpg");
}
