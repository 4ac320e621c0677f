use super::*;
use crate::test_utils::{init_test_db, insert_test_collection};

#[tokio::test]
async fn new_folder_lands_under_its_parent() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    let child = insert_folder(&ctx.store, &mut conn, "Artists", false, &root)
        .await
        .unwrap()
        .expect("creation should succeed");

    let found = select_folder_by_name_and_parent(&ctx.store, &mut conn, "Artists", root.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, child.id);
}

#[tokio::test]
async fn duplicate_child_name_is_rejected() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    insert_folder(&ctx.store, &mut conn, "Artists", false, &root)
        .await
        .unwrap()
        .unwrap();

    let duplicate = insert_folder(&ctx.store, &mut conn, "artists", false, &root)
        .await
        .unwrap();
    assert!(duplicate.is_none());
}

#[tokio::test]
async fn adding_collection_to_folder_removes_root_link() {
    let ctx = init_test_db().await;
    let collection = insert_test_collection(&ctx.store, "to move").await;

    let mut conn = ctx.store.conn().await.unwrap();
    insert_collection_to_root_if_in_none(&mut conn, collection.id)
        .await
        .unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    let folder = insert_folder(&ctx.store, &mut conn, "Target", false, &root)
        .await
        .unwrap()
        .unwrap();

    insert_collection_to_folder(&mut conn, folder.id, collection.id)
        .await
        .unwrap();

    let parents = select_folders_collection_is_in(&mut conn, collection.id)
        .await
        .unwrap();
    assert_eq!(parents, vec![folder.id]);
}

#[tokio::test]
async fn removing_last_folder_reparents_collection_to_root() {
    let ctx = init_test_db().await;
    let collection = insert_test_collection(&ctx.store, "homeless").await;

    let mut conn = ctx.store.conn().await.unwrap();
    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    let folder = insert_folder(&ctx.store, &mut conn, "Target", false, &root)
        .await
        .unwrap()
        .unwrap();
    insert_collection_to_folder(&mut conn, folder.id, collection.id)
        .await
        .unwrap();

    delete_collection_from_folder(&mut conn, folder.id, collection.id)
        .await
        .unwrap();

    let parents = select_folders_collection_is_in(&mut conn, collection.id)
        .await
        .unwrap();
    assert_eq!(parents, vec![ROOT_FOLDER_ID]);
}

#[tokio::test]
async fn folder_rename_rejects_sibling_conflicts() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    insert_folder(&ctx.store, &mut conn, "Existing", false, &root)
        .await
        .unwrap()
        .unwrap();
    let folder = insert_folder(&ctx.store, &mut conn, "Renaming", false, &root)
        .await
        .unwrap()
        .unwrap();

    let (ok, message) = rename_folder(&ctx.store, &mut conn, &folder, "existing")
        .await
        .unwrap();
    assert!(!ok);
    assert!(!message.is_empty());
    assert_eq!(folder.name(), "Renaming");

    let (ok, _) = rename_folder(&ctx.store, &mut conn, &folder, "Fresh Name")
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(folder.name(), "Fresh Name");
}

#[tokio::test]
async fn folder_can_sit_under_multiple_parents() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    let parent_a = insert_folder(&ctx.store, &mut conn, "A", false, &root)
        .await
        .unwrap()
        .unwrap();
    let parent_b = insert_folder(&ctx.store, &mut conn, "B", false, &root)
        .await
        .unwrap()
        .unwrap();
    let child = insert_folder(&ctx.store, &mut conn, "Shared", false, &parent_a)
        .await
        .unwrap()
        .unwrap();

    assert!(insert_folder_to_folder(&mut conn, &child, parent_b.id)
        .await
        .unwrap());
    assert_eq!(
        select_folder_parent_count(&mut conn, child.id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn unlinked_folder_can_be_reattached_to_root() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let root = select_root_folder(&ctx.store, &mut conn).await.unwrap();
    let folder = insert_folder(&ctx.store, &mut conn, "Loose", false, &root)
        .await
        .unwrap()
        .unwrap();

    delete_folder_from_folder(&mut conn, folder.id, root.id)
        .await
        .unwrap();
    assert_eq!(
        select_folder_parent_count(&mut conn, folder.id).await.unwrap(),
        0
    );

    insert_to_root_if_in_no_folders(&mut conn, folder.id)
        .await
        .unwrap();
    assert_eq!(
        select_folder_parents(&mut conn, folder.id).await.unwrap(),
        vec![ROOT_FOLDER_ID]
    );
}
