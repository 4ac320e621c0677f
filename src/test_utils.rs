use std::sync::{Arc, Once};

use crate::database::{collection_repo, image_repo, Store};
use crate::types::models::{Collection, Image};

static INIT: Once = Once::new();

pub struct TestContext {
    pub store: Arc<Store>,
}

/// Creates an in-memory store with the full schema and seed rows.
pub async fn init_test_db() -> TestContext {
    INIT.call_once(|| {
        // Initialize logger only once
        let _ = env_logger::builder().is_test(true).try_init();
    });

    let store = Store::open_in_memory()
        .await
        .expect("Failed to create in-memory database");

    TestContext { store }
}

/// Inserts an image row with plausible defaults.
pub async fn insert_test_image(store: &Arc<Store>, name: &str, hash: &str) -> Arc<Image> {
    let mut conn = store.conn().await.expect("acquire connection");
    image_repo::insert_image(
        store,
        &mut conn,
        &image_repo::NewImage {
            relative_path: format!(":?ocl/collections/test/{name}.jpg"),
            width: 800,
            height: 600,
            name: name.to_string(),
            extension: ".jpg".to_string(),
            is_private: false,
            from_file: format!("/tmp/{name}.jpg"),
            file_hash: hash.to_string(),
        },
    )
    .await
    .expect("insert image")
}

pub async fn insert_test_collection(store: &Arc<Store>, name: &str) -> Arc<Collection> {
    let mut conn = store.conn().await.expect("acquire connection");
    collection_repo::insert_collection(store, &mut conn, name, false)
        .await
        .expect("insert collection")
}

/// Inserts an image and links it into the collection at the tail.
pub async fn insert_image_in_collection(
    store: &Arc<Store>,
    collection: &Collection,
    name: &str,
    hash: &str,
) -> Arc<Image> {
    let image = insert_test_image(store, name, hash).await;
    let mut conn = store.conn().await.expect("acquire connection");
    collection_repo::add_image_to_collection(&mut conn, collection.id, image.id)
        .await
        .expect("add image to collection");
    image
}
