use std::sync::Arc;

use super::*;
use crate::test_utils::init_test_db;

fn gallery_fixture() -> NewNetGallery {
    NewNetGallery {
        gallery_url: "https://example.com/gallery/1".into(),
        target_path: "Root/Downloads".into(),
        gallery_name: "test gallery".into(),
        tags_string: "flower;red".into(),
    }
}

fn file_fixture(n: u32) -> NewNetFile {
    NewNetFile {
        file_url: format!("https://example.com/files/{n}.jpg"),
        page_referrer: "https://example.com/gallery/1".into(),
        preferred_name: format!("{n}.jpg"),
        tags_list: String::new(),
    }
}

#[tokio::test]
async fn gallery_crud_and_identity() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let gallery = insert_net_gallery(&ctx.store, &mut conn, &gallery_fixture())
        .await
        .unwrap();

    let loaded = select_net_gallery_by_id(&ctx.store, &mut conn, gallery.id)
        .await
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&gallery, &loaded));

    gallery.set_downloaded(true);
    update_net_gallery(&mut conn, &gallery).await.unwrap();

    let downloaded: bool =
        sqlx::query_scalar("SELECT is_downloaded FROM net_gallery WHERE id = ?")
            .bind(gallery.id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert!(downloaded);
}

#[tokio::test]
async fn not_downloaded_filter_works() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let pending = insert_net_gallery(&ctx.store, &mut conn, &gallery_fixture())
        .await
        .unwrap();
    let done = insert_net_gallery(
        &ctx.store,
        &mut conn,
        &NewNetGallery {
            gallery_url: "https://example.com/gallery/2".into(),
            ..gallery_fixture()
        },
    )
    .await
    .unwrap();
    done.set_downloaded(true);
    update_net_gallery(&mut conn, &done).await.unwrap();

    let pending_ids = select_net_gallery_ids(&mut conn, true).await.unwrap();
    assert_eq!(pending_ids, vec![pending.id]);

    let all_ids = select_net_gallery_ids(&mut conn, false).await.unwrap();
    assert_eq!(all_ids.len(), 2);
}

#[tokio::test]
async fn files_belong_to_their_gallery() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let gallery = insert_net_gallery(&ctx.store, &mut conn, &gallery_fixture())
        .await
        .unwrap();
    insert_net_file(&mut conn, gallery.id, &file_fixture(1)).await.unwrap();
    insert_net_file(&mut conn, gallery.id, &file_fixture(2)).await.unwrap();

    let files = select_net_files_from_gallery(&mut conn, gallery.id)
        .await
        .unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].preferred_name, "1.jpg");
}

#[tokio::test]
async fn replace_items_swaps_the_whole_set() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let gallery = insert_net_gallery(&ctx.store, &mut conn, &gallery_fixture())
        .await
        .unwrap();
    insert_net_file(&mut conn, gallery.id, &file_fixture(1)).await.unwrap();

    replace_gallery_items(&mut conn, gallery.id, &[file_fixture(5), file_fixture(6)])
        .await
        .unwrap();

    let files = select_net_files_from_gallery(&mut conn, gallery.id)
        .await
        .unwrap();
    let names: Vec<_> = files.iter().map(|f| f.preferred_name.as_str()).collect();
    assert_eq!(names, vec!["5.jpg", "6.jpg"]);
}

#[tokio::test]
async fn purge_removes_gallery_and_files() {
    let ctx = init_test_db().await;
    let mut conn = ctx.store.conn().await.unwrap();

    let gallery = insert_net_gallery(&ctx.store, &mut conn, &gallery_fixture())
        .await
        .unwrap();
    insert_net_file(&mut conn, gallery.id, &file_fixture(1)).await.unwrap();

    purge_net_gallery(&ctx.store, &mut conn, gallery.id)
        .await
        .unwrap();

    let galleries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM net_gallery")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM net_files")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(galleries, 0);
    assert_eq!(files, 0);
    assert!(gallery.is_deleted());
}
