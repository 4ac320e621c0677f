use super::*;
use crate::test_utils::init_test_db;

#[tokio::test]
async fn signature_round_trip() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.signature_pool().acquire().await.unwrap();

    insert_signature(&mut conn, 7, "abcdefghijklmnopqrst").await.unwrap();
    let loaded = select_signature_by_id(&mut conn, 7).await.unwrap();
    assert_eq!(loaded.as_deref(), Some("abcdefghijklmnopqrst"));

    // 20 chars chunk into two 10-char words.
    let words: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM picture_signature_words WHERE picture_id = 7")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert_eq!(words, 2);
}

#[tokio::test]
async fn replacing_a_signature_rewrites_words() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.signature_pool().acquire().await.unwrap();

    insert_signature(&mut conn, 7, "abcdefghijklmnopqrst").await.unwrap();
    insert_signature(&mut conn, 7, "0123456789").await.unwrap();

    let loaded = select_signature_by_id(&mut conn, 7).await.unwrap();
    assert_eq!(loaded.as_deref(), Some("0123456789"));

    let words: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM picture_signature_words WHERE picture_id = 7")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert_eq!(words, 1);
}

#[tokio::test]
async fn delete_removes_signature_and_words() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.signature_pool().acquire().await.unwrap();

    insert_signature(&mut conn, 7, "abcdefghij").await.unwrap();
    delete_signature(&mut conn, 7).await.unwrap();

    assert!(select_signature_by_id(&mut conn, 7).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_signatures_are_diffed() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.signature_pool().acquire().await.unwrap();

    insert_signature(&mut conn, 1, "abcdefghij").await.unwrap();

    let missing = filter_ids_without_signature(&mut conn, &[1, 2, 3])
        .await
        .unwrap();
    assert_eq!(missing, vec![2, 3]);
}

#[tokio::test]
async fn shared_words_flag_potential_duplicates() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.signature_pool().acquire().await.unwrap();

    // Two signatures sharing both words, a third sharing none.
    insert_signature(&mut conn, 1, "aaaaaaaaaabbbbbbbbbb").await.unwrap();
    insert_signature(&mut conn, 2, "aaaaaaaaaabbbbbbbbbb").await.unwrap();
    insert_signature(&mut conn, 3, "cccccccccc").await.unwrap();

    let duplicates = select_potential_duplicates(&mut conn, 2).await.unwrap();
    assert_eq!(duplicates.len(), 1);
    let matches = duplicates.get(&1).expect("lower id is the original");
    assert_eq!(matches, &vec![(2, 2)]);
}
