//! pixvault: a local image library manager.
//!
//! Images are content-addressed files organised into collections and
//! folders, tagged with a structured vocabulary, and rendered through an
//! in-memory cache with an on-disk thumbnail store. Destructive
//! operations go through a journal of reversible actions.

pub mod database;
pub mod services;
pub mod tasks;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::sync::Arc;

use database::Store;
use services::actions::history::ActionHistory;
use services::config::Settings;
use services::images::ImageCache;
use types::StoreResult;

/// Everything a running instance needs, wired together.
pub struct PixVault {
    pub settings: Settings,
    pub store: Arc<Store>,
    pub cache: Arc<ImageCache>,
    pub history: Arc<ActionHistory>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl PixVault {
    /// Opens the store under the configured folders and starts the image
    /// workers.
    pub async fn init(settings: Settings) -> StoreResult<Self> {
        settings.ensure_folders_exist()?;

        let store = Store::open(&settings).await?;
        let cache = ImageCache::new(
            settings.thumbnail_folder(),
            settings.thumbnail_background,
        );
        let workers = cache.start();

        let history = Arc::new(ActionHistory::new(
            store.clone(),
            settings.clone(),
            settings.action_history_size as usize,
        ));

        Ok(Self {
            settings,
            store,
            cache,
            history,
            workers,
        })
    }

    /// Flags the workers to quit and waits for them to finish.
    pub async fn shutdown(mut self) {
        self.cache.quit_processing();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}
