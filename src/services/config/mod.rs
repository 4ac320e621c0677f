//! Runtime settings persisted as a JSON file.
//!
//! A missing file yields defaults and is created on the first save. The
//! collection roots decide where imported files and thumbnails land; the
//! database stores paths relative to these roots so moving an install only
//! needs the settings updated.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Current version of the settings file format.
pub const SETTINGS_VERSION: u32 = 1;

pub const DATABASE_FILE_NAME: &str = "pixvault.sqlite";
pub const SIGNATURES_FILE_NAME: &str = "signatures.sqlite";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    /// Folder the sqlite databases live in.
    pub database_folder: PathBuf,
    /// Base folder for the public collection.
    pub public_collection: PathBuf,
    /// Base folder for the private collection.
    pub private_collection: PathBuf,
    /// Maximum failed fetches per file when downloading.
    pub max_download_retries: u32,
    /// Number of actions kept for undo purposes.
    pub action_history_size: u32,
    /// Print verbose output for HTTP transfers.
    pub http_debug: bool,
    /// Background colour mixed into thumbnails that lose their alpha
    /// channel, as 0-255 RGB.
    pub thumbnail_background: [u8; 3],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            database_folder: PathBuf::from("./"),
            public_collection: PathBuf::from("./public_collection/"),
            private_collection: PathBuf::from("./private_collection/"),
            max_download_retries: 5,
            action_history_size: 50,
            http_debug: false,
            thumbnail_background: [255, 255, 255],
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(file: &Path) -> Self {
        match fs::read_to_string(file) {
            Ok(text) => match serde_json::from_str::<Settings>(&text) {
                Ok(settings) => {
                    if settings.version > SETTINGS_VERSION {
                        warn!(
                            "Settings file version {} is newer than supported {}, using defaults",
                            settings.version, SETTINGS_VERSION
                        );
                        return Settings::default();
                    }
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings file {:?}: {e}, using defaults", file);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, file: &Path) -> io::Result<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(file, text)
    }

    pub fn database_file(&self) -> PathBuf {
        self.database_folder.join(DATABASE_FILE_NAME)
    }

    pub fn signatures_file(&self) -> PathBuf {
        self.database_folder.join(SIGNATURES_FILE_NAME)
    }

    pub fn staging_folder(&self) -> PathBuf {
        self.private_collection.join("staging")
    }

    pub fn thumbnail_folder(&self) -> PathBuf {
        self.private_collection.join("thumbnails")
    }

    pub fn set_action_history_size(&mut self, size: u32) {
        self.action_history_size = size.clamp(1, 1000);
    }

    /// Creates the collection, staging and thumbnail trees if missing.
    pub fn ensure_folders_exist(&self) -> io::Result<()> {
        fs::create_dir_all(&self.database_folder)?;
        fs::create_dir_all(self.public_collection.join("collections"))?;
        fs::create_dir_all(self.private_collection.join("collections"))?;
        fs::create_dir_all(self.staging_folder())?;
        fs::create_dir_all(self.thumbnail_folder())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
