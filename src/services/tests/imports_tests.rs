use image::{Rgba, RgbaImage};

use super::*;
use crate::database::collection_repo;
use crate::test_utils::init_test_db;

fn import_settings(dir: &tempfile::TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.database_folder = dir.path().join("db");
    settings.public_collection = dir.path().join("public");
    settings.private_collection = dir.path().join("private");
    settings.ensure_folders_exist().unwrap();
    settings
}

fn write_source_png(dir: &tempfile::TempDir, name: &str, shade: u8) -> std::path::PathBuf {
    let path = dir.path().join(name);
    RgbaImage::from_pixel(32, 32, Rgba([shade, shade, shade, 255]))
        .save(&path)
        .unwrap();
    path
}

#[tokio::test]
async fn import_moves_file_and_creates_rows() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);
    let source = write_source_png(&dir, "pic.png", 10);

    let outcome =
        import_file_to_collection(&ctx.store, &settings, &source, "holiday", false)
            .await
            .unwrap();

    assert!(!outcome.was_duplicate);
    assert!(!source.exists());
    assert!(outcome.image.relative_path().starts_with(":?ocl/"));
    assert!(!outcome.image.file_hash().is_empty());
    assert_eq!(outcome.image.row().width, 32);

    let mut conn = ctx.store.conn().await.unwrap();
    let collection = collection_repo::select_collection_by_name(&ctx.store, &mut conn, "holiday")
        .await
        .unwrap()
        .expect("collection should have been created");
    let images =
        collection_repo::select_images_in_collection(&ctx.store, &mut conn, collection.id, -1)
            .await
            .unwrap();
    assert_eq!(images.len(), 1);

    // The stored path resolves to a real file on disk.
    let on_disk = paths::to_final_path(&settings, &outcome.image.relative_path());
    assert!(on_disk.is_file());
}

#[tokio::test]
async fn duplicate_content_resolves_to_the_existing_image() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);

    let first_file = write_source_png(&dir, "a.png", 42);
    let second_file = write_source_png(&dir, "b.png", 42);

    let first = import_file_to_collection(&ctx.store, &settings, &first_file, "dups", false)
        .await
        .unwrap();
    let second = import_file_to_collection(&ctx.store, &settings, &second_file, "dups", false)
        .await
        .unwrap();

    assert!(!first.was_duplicate);
    assert!(second.was_duplicate);
    assert_eq!(first.image.id, second.image.id);
    assert!(std::sync::Arc::ptr_eq(&first.image, &second.image));
}

#[tokio::test]
async fn two_distinct_files_get_sequential_orders() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);

    let first_file = write_source_png(&dir, "a.png", 1);
    let second_file = write_source_png(&dir, "b.png", 2);

    let first =
        import_file_to_collection(&ctx.store, &settings, &first_file, "test collection", false)
            .await
            .unwrap();
    let second =
        import_file_to_collection(&ctx.store, &settings, &second_file, "test collection", false)
            .await
            .unwrap();

    let mut conn = ctx.store.conn().await.unwrap();
    let collection =
        collection_repo::select_collection_by_name(&ctx.store, &mut conn, "test collection")
            .await
            .unwrap()
            .unwrap();

    assert_eq!(
        collection_repo::select_image_show_order(&mut conn, collection.id, first.image.id)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        collection_repo::select_image_show_order(&mut conn, collection.id, second.image.id)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn non_image_files_are_rejected() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);

    let bogus = dir.path().join("file.png");
    std::fs::write(&bogus, b"not an image at all").unwrap();

    let result = import_file_to_collection(&ctx.store, &settings, &bogus, "c", false).await;
    assert!(matches!(
        result,
        Err(crate::types::StoreError::InvalidArgument(_))
    ));
    // Failed imports leave the source alone.
    assert!(bogus.exists());
}

#[tokio::test]
async fn missing_file_is_invalid_argument() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);

    let result =
        import_file_to_collection(&ctx.store, &settings, &dir.path().join("gone.png"), "c", false)
            .await;
    assert!(matches!(
        result,
        Err(crate::types::StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn folder_import_picks_up_nested_images() {
    let ctx = init_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = import_settings(&dir);

    let tree = dir.path().join("incoming/nested");
    std::fs::create_dir_all(&tree).unwrap();
    RgbaImage::from_pixel(16, 16, Rgba([1, 2, 3, 255]))
        .save(tree.join("deep.png"))
        .unwrap();
    RgbaImage::from_pixel(16, 16, Rgba([3, 2, 1, 255]))
        .save(dir.path().join("incoming/shallow.png"))
        .unwrap();
    std::fs::write(dir.path().join("incoming/readme.txt"), b"skip me").unwrap();

    let outcomes = import_folder(
        &ctx.store,
        &settings,
        &dir.path().join("incoming"),
        "scanned",
        false,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
}
