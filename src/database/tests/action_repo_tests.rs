use super::*;
use crate::test_utils::init_test_db;

#[tokio::test]
async fn insert_and_select_round_trip() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let id = insert_action(&mut conn, 1, r#"{"images":[3,4]}"#, "Deleted 2 images")
        .await
        .unwrap();

    let row = select_action_by_id(&mut conn, id).await.unwrap().unwrap();
    assert_eq!(row.action_type, 1);
    assert!(!row.performed);
    assert_eq!(row.json_data, r#"{"images":[3,4]}"#);
    assert_eq!(row.description, "Deleted 2 images");
}

#[tokio::test]
async fn performed_flag_updates() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let id = insert_action(&mut conn, 1, "{}", "").await.unwrap();
    set_action_performed(&mut conn, id, true).await.unwrap();

    let row = select_action_by_id(&mut conn, id).await.unwrap().unwrap();
    assert!(row.performed);
}

#[tokio::test]
async fn oldest_action_is_selected_first() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let first = insert_action(&mut conn, 1, "{}", "first").await.unwrap();
    insert_action(&mut conn, 2, "{}", "second").await.unwrap();

    let oldest = select_oldest_action(&mut conn).await.unwrap().unwrap();
    assert_eq!(oldest.id, first);
    assert_eq!(count_actions(&mut conn).await.unwrap(), 2);
}

#[tokio::test]
async fn latest_actions_filter_by_search() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    insert_action(&mut conn, 1, r#"{"images":[1]}"#, "Deleted an image")
        .await
        .unwrap();
    insert_action(&mut conn, 4, "{}", "Reordered collection 9")
        .await
        .unwrap();

    let all = select_latest_actions(&mut conn, "", -1).await.unwrap();
    assert_eq!(all.len(), 2);
    // Latest first.
    assert_eq!(all[0].action_type, 4);

    let filtered = select_latest_actions(&mut conn, "Reordered", -1)
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].action_type, 4);
}

#[tokio::test]
async fn delete_removes_the_row() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let id = insert_action(&mut conn, 1, "{}", "").await.unwrap();
    delete_action(&mut conn, id).await.unwrap();

    assert!(select_action_by_id(&mut conn, id).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_descriptions_are_found() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    insert_action(&mut conn, 1, "{}", "").await.unwrap();
    insert_action(&mut conn, 1, "{}", "has one").await.unwrap();

    let missing = select_actions_without_description(&mut conn).await.unwrap();
    assert_eq!(missing.len(), 1);
}
