use std::path::PathBuf;

use image::{Rgba, RgbaImage};
use pixvault::services::config::Settings;
use pixvault::PixVault;

/// Settings rooted inside the temp dir so each test gets its own store
/// and collection tree.
pub fn settings_in(dir: &tempfile::TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.database_folder = dir.path().join("db");
    settings.public_collection = dir.path().join("public");
    settings.private_collection = dir.path().join("private");
    settings
}

pub async fn init_app(dir: &tempfile::TempDir) -> PixVault {
    let _ = env_logger::builder().is_test(true).try_init();
    PixVault::init(settings_in(dir))
        .await
        .expect("app should initialise")
}

/// Writes a small png whose content (and therefore hash) depends on
/// `shade`.
pub fn write_png(dir: &tempfile::TempDir, name: &str, shade: u8) -> PathBuf {
    let path = dir.path().join(name);
    RgbaImage::from_pixel(24, 24, Rgba([shade, shade / 2, shade / 3, 255]))
        .save(&path)
        .unwrap();
    path
}
