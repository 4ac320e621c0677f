use super::*;
use crate::test_utils::init_test_db;

#[tokio::test]
async fn fresh_database_has_current_version() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let version = select_version(&mut conn).await;
    assert_eq!(version, Some(DATABASE_CURRENT_VERSION));
}

#[tokio::test]
async fn uncategorized_collection_gets_the_fixed_id() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let name: Option<String> =
        sqlx::query_scalar("SELECT name FROM collections WHERE id = ?")
            .bind(UNCATEGORIZED_COLLECTION_ID)
            .fetch_optional(&mut *conn)
            .await
            .unwrap();
    assert_eq!(name.as_deref(), Some("Uncategorized"));
}

#[tokio::test]
async fn root_folder_exists() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = folder_repo::select_root_folder(&ctx.store, &mut conn)
        .await
        .unwrap();
    assert_eq!(root.id, ROOT_FOLDER_ID);
    assert_eq!(root.name(), "Root");
}

#[tokio::test]
async fn transactions_commit_and_rollback() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    begin(&mut conn).await.unwrap();
    sqlx::query("INSERT INTO tags (name) VALUES ('tx_test')")
        .execute(&mut *conn)
        .await
        .unwrap();
    rollback(&mut conn).await.unwrap();

    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'tx_test'")
        .fetch_optional(&mut *conn)
        .await
        .unwrap();
    assert!(found.is_none());

    begin(&mut conn).await.unwrap();
    sqlx::query("INSERT INTO tags (name) VALUES ('tx_test')")
        .execute(&mut *conn)
        .await
        .unwrap();
    commit(&mut conn).await.unwrap();

    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'tx_test'")
        .fetch_optional(&mut *conn)
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn savepoints_nest_and_roll_back() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    begin_savepoint(&mut conn, "outer").await.unwrap();
    sqlx::query("INSERT INTO tags (name) VALUES ('sp_kept')")
        .execute(&mut *conn)
        .await
        .unwrap();

    begin_savepoint(&mut conn, "inner").await.unwrap();
    sqlx::query("INSERT INTO tags (name) VALUES ('sp_dropped')")
        .execute(&mut *conn)
        .await
        .unwrap();
    rollback_savepoint(&mut conn, "inner").await.unwrap();
    release_savepoint(&mut conn, "inner").await.unwrap();

    release_savepoint(&mut conn, "outer").await.unwrap();

    let kept: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'sp_kept'")
        .fetch_optional(&mut *conn)
        .await
        .unwrap();
    let dropped: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'sp_dropped'")
        .fetch_optional(&mut *conn)
        .await
        .unwrap();
    assert!(kept.is_some());
    assert!(dropped.is_none());
}

#[tokio::test]
async fn savepoint_names_are_validated() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let result = begin_savepoint(&mut conn, "bad name; DROP TABLE tags").await;
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

    let result = begin_savepoint(&mut conn, "").await;
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn purge_inactive_cache_drops_dead_entries() {
    let ctx = init_test_db().await;
    let image = crate::test_utils::insert_test_image(&ctx.store, "img", "purgehash").await;

    assert_eq!(ctx.store.loaded_images.live_count(), 1);
    drop(image);
    ctx.store.purge_inactive_cache();
    assert_eq!(ctx.store.loaded_images.live_count(), 0);
}
