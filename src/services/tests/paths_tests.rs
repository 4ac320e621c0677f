use std::path::PathBuf;

use super::*;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.public_collection = PathBuf::from("/data/public");
    settings.private_collection = PathBuf::from("/data/private");
    settings
}

#[test]
fn prefixes_expand_against_roots() {
    let settings = test_settings();

    assert_eq!(
        to_final_path(&settings, ":?ocl/collections/cats/a.jpg"),
        PathBuf::from("/data/public/collections/cats/a.jpg")
    );
    assert_eq!(
        to_final_path(&settings, ":?scl/collections/cats/a.jpg"),
        PathBuf::from("/data/private/collections/cats/a.jpg")
    );
}

#[test]
fn unknown_paths_pass_through() {
    let settings = test_settings();
    assert_eq!(
        to_final_path(&settings, "/somewhere/else.jpg"),
        PathBuf::from("/somewhere/else.jpg")
    );
    assert_eq!(to_final_path(&settings, ""), PathBuf::new());
}

#[test]
fn database_path_round_trips() {
    let settings = test_settings();

    for stored in [
        ":?ocl/collections/cats/a.jpg",
        ":?scl/collections/private stuff/b.png",
    ] {
        let expanded = to_final_path(&settings, stored);
        assert_eq!(to_database_path(&settings, &expanded), stored);
    }
}

#[test]
fn paths_outside_roots_get_an_error_marker() {
    let settings = test_settings();
    let result = to_database_path(&settings, &PathBuf::from("/elsewhere/c.jpg"));
    assert!(result.starts_with("ERROR_DATABASIFYING:"));
}

#[test]
fn move_file_renames_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.bin");
    let target = dir.path().join("sub/b.bin");
    std::fs::write(&source, b"0123456789").unwrap();

    move_file(&source, &target).unwrap();

    assert!(!source.exists());
    assert_eq!(std::fs::read(&target).unwrap(), b"0123456789");
}

#[test]
fn move_file_missing_source_is_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    let result = move_file(&dir.path().join("nope"), &dir.path().join("out"));
    assert!(matches!(
        result,
        Err(crate::types::StoreError::InvalidArgument(_))
    ));
}
