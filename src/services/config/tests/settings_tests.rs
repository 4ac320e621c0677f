use super::*;

#[test]
fn defaults_are_sane() {
    let settings = Settings::default();
    assert_eq!(settings.version, SETTINGS_VERSION);
    assert_eq!(settings.max_download_retries, 5);
    assert_eq!(settings.action_history_size, 50);
    assert!(settings
        .database_file()
        .to_string_lossy()
        .ends_with(DATABASE_FILE_NAME));
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("nope.json"));
    assert_eq!(settings.version, SETTINGS_VERSION);
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.max_download_retries = 9;
    settings.private_collection = dir.path().join("priv");
    settings.save(&file).unwrap();

    let loaded = Settings::load(&file);
    assert_eq!(loaded.max_download_retries, 9);
    assert_eq!(loaded.private_collection, dir.path().join("priv"));
}

#[test]
fn corrupt_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("settings.json");
    std::fs::write(&file, "{not json").unwrap();

    let loaded = Settings::load(&file);
    assert_eq!(loaded.max_download_retries, 5);
}

#[test]
fn action_history_size_is_clamped() {
    let mut settings = Settings::default();
    settings.set_action_history_size(0);
    assert_eq!(settings.action_history_size, 1);
    settings.set_action_history_size(100_000);
    assert_eq!(settings.action_history_size, 1000);
}

#[test]
fn derived_folders_live_under_private_root() {
    let mut settings = Settings::default();
    settings.private_collection = std::path::PathBuf::from("/data/private");
    assert_eq!(
        settings.staging_folder(),
        std::path::PathBuf::from("/data/private/staging")
    );
    assert_eq!(
        settings.thumbnail_folder(),
        std::path::PathBuf::from("/data/private/thumbnails")
    );
}

#[test]
fn ensure_folders_creates_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.database_folder = dir.path().join("db");
    settings.public_collection = dir.path().join("public");
    settings.private_collection = dir.path().join("private");

    settings.ensure_folders_exist().unwrap();
    assert!(dir.path().join("public/collections").is_dir());
    assert!(dir.path().join("private/thumbnails").is_dir());
    assert!(dir.path().join("private/staging").is_dir());
}
