//! Process-wide registry of loaded full-size images plus the worker
//! tasks that decode, thumbnail and evict them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use log::{info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::services::images::codec::{self, DecodedImage};
use crate::services::images::thumbnailer;
use crate::tasks::{TaskHandle, TaskQueue};
use crate::types::{StoreError, StoreResult};

/// Unreferenced entries older than this get dropped by the eviction pass.
const UNLOAD_TIME_MS: i64 = 30_000;

/// When nothing new has been cached for this long, one entry per cycle is
/// dropped even if still below the age threshold.
const UNLOAD_ANYWAY_SECS: i64 = 60;

/// Hard cap on cached full-size images.
const MAX_CACHED_IMAGES: usize = 10;

/// Forced unloads are bounded per cycle to avoid long pauses.
const MAX_FORCED_UNLOADS_PER_CYCLE: usize = 40;

/// Eviction tick.
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Load status of a [`LoadedImage`]. Terminal states are permanent.
#[derive(Debug, Clone)]
pub enum LoadState {
    Waiting,
    Loaded(Arc<DecodedImage>),
    Failed(String),
}

/// Holds an image that is loading or has been loaded into memory.
#[derive(Debug)]
pub struct LoadedImage {
    path: Mutex<String>,
    state: Mutex<LoadState>,
    last_used: AtomicI64,
    load_task: Mutex<Option<Arc<TaskHandle>>>,
}

impl LoadedImage {
    fn new(path: String) -> Arc<Self> {
        Arc::new(Self {
            path: Mutex::new(path),
            state: Mutex::new(LoadState::Waiting),
            last_used: AtomicI64::new(now_ms()),
            load_task: Mutex::new(None),
        })
    }

    /// True once this image is no longer waiting.
    pub fn is_loaded(&self) -> bool {
        !matches!(*self.state.lock().unwrap(), LoadState::Waiting)
    }

    /// True when loading succeeded and the frames are available.
    pub fn is_valid(&self) -> bool {
        match &*self.state.lock().unwrap() {
            LoadState::Loaded(decoded) => !decoded.is_empty(),
            _ => false,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Option<Arc<DecodedImage>> {
        match &*self.state.lock().unwrap() {
            LoadState::Loaded(decoded) => Some(decoded.clone()),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        self.path.lock().unwrap().clone()
    }

    /// True when this entry represents `path`; failed entries match
    /// nothing.
    pub fn path_matches(&self, path: &str) -> bool {
        if matches!(*self.state.lock().unwrap(), LoadState::Failed(_)) {
            return false;
        }
        *self.path.lock().unwrap() == path
    }

    /// Called when the underlying file moved. Failed entries keep their
    /// error message instead.
    pub fn on_moved(&self, new_path: &str) {
        if matches!(*self.state.lock().unwrap(), LoadState::Failed(_)) {
            return;
        }
        *self.path.lock().unwrap() = new_path.to_string();
    }

    pub fn error(&self) -> Option<String> {
        match &*self.state.lock().unwrap() {
            LoadState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn reset_active_time(&self) {
        self.last_used.store(now_ms(), Ordering::Release);
    }

    pub fn last_used_ms(&self) -> i64 {
        self.last_used.load(Ordering::Acquire)
    }

    pub fn register_load_task(&self, task: Arc<TaskHandle>) {
        *self.load_task.lock().unwrap() = Some(task);
    }

    /// Re-prioritises the queued load. No-op once loaded.
    pub fn bump_load_priority(&self) {
        if self.is_loaded() {
            return;
        }
        if let Some(task) = &*self.load_task.lock().unwrap() {
            task.bump();
        }
    }

    /// A success arriving after a failure is rejected: terminal states
    /// are permanent per object.
    pub fn on_load_success(&self, decoded: Arc<DecodedImage>) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, LoadState::Failed(_)) {
            warn!(
                "Ignoring load success for already failed image: {}",
                self.path.lock().unwrap()
            );
            return;
        }
        *state = LoadState::Loaded(decoded);
        *self.load_task.lock().unwrap() = None;
    }

    pub fn on_load_fail(&self, error: String) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, LoadState::Loaded(_)) {
            warn!("Ignoring load failure for already loaded image: {error}");
            return;
        }
        *state = LoadState::Failed(error);
        *self.load_task.lock().unwrap() = None;
    }

    pub fn width(&self) -> StoreResult<u32> {
        self.frames()
            .map(|frames| frames.width())
            .ok_or_else(|| StoreError::InvalidState("image not loaded".into()))
    }

    pub fn height(&self) -> StoreResult<u32> {
        self.frames()
            .map(|frames| frames.height())
            .ok_or_else(|| StoreError::InvalidState("image not loaded".into()))
    }

    pub fn frame_count(&self) -> StoreResult<usize> {
        self.frames()
            .map(|frames| frames.frame_count())
            .ok_or_else(|| StoreError::InvalidState("image not loaded".into()))
    }
}

/// Shared folder/collection bitmaps built on first use.
#[derive(Clone)]
pub struct ResourceIcons {
    pub folder_icon: Arc<DecodedImage>,
    pub collection_icon: Arc<DecodedImage>,
    pub folder_as_image: Arc<LoadedImage>,
}

pub struct ImageCache {
    cache: Mutex<Vec<Arc<LoadedImage>>>,
    load_queue: TaskQueue<Arc<LoadedImage>>,
    thumb_queue: TaskQueue<(Arc<LoadedImage>, String)>,
    load_notify: Notify,
    thumb_notify: Notify,
    cleanup_notify: Notify,
    quitting: AtomicBool,
    last_insert: AtomicI64,
    thumbnail_dir: PathBuf,
    background: [u8; 3],
    icons: Mutex<Option<ResourceIcons>>,
}

impl ImageCache {
    pub fn new(thumbnail_dir: PathBuf, background: [u8; 3]) -> Arc<Self> {
        Arc::new(Self {
            cache: Mutex::new(Vec::new()),
            load_queue: TaskQueue::new(),
            thumb_queue: TaskQueue::new(),
            load_notify: Notify::new(),
            thumb_notify: Notify::new(),
            cleanup_notify: Notify::new(),
            quitting: AtomicBool::new(false),
            last_insert: AtomicI64::new(now_ms()),
            thumbnail_dir,
            background,
            icons: Mutex::new(None),
        })
    }

    /// Spawns the loader, thumbnail and eviction workers.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_full_size_loader()),
            tokio::spawn(self.clone().run_thumbnail_generator()),
            tokio::spawn(self.clone().run_cache_cleanup()),
        ]
    }

    /// Returns an image that will hold the full decoded file once the
    /// loader gets to it. Two requests for the same path share an entry.
    pub fn load_full(self: &Arc<Self>, path: &str) -> Arc<LoadedImage> {
        let mut cache = self.cache.lock().unwrap();

        if let Some(cached) = cache.iter().find(|img| img.path_matches(path)) {
            return cached.clone();
        }

        info!("Opening full size image: {path}");
        let created = LoadedImage::new(path.to_string());
        cache.push(created.clone());
        drop(cache);

        let handle = self.load_queue.push(created.clone());
        created.register_load_task(handle);
        self.last_insert.store(now_ms(), Ordering::Release);
        self.load_notify.notify_waiters();

        created
    }

    /// Returns an image that will hold the thumbnail for (path, hash).
    /// Thumbnails are not deduplicated across callers.
    pub fn load_thumb(self: &Arc<Self>, path: &str, hash: &str) -> Arc<LoadedImage> {
        if hash.is_empty() {
            return self.create_load_failure("load_thumb called with an empty hash");
        }

        let created = LoadedImage::new(path.to_string());
        let handle = self.thumb_queue.push((created.clone(), hash.to_string()));
        created.register_load_task(handle);
        self.thumb_notify.notify_waiters();

        created
    }

    /// An image already in the failed state, for callers that detected a
    /// problem before loading could start.
    pub fn create_load_failure(&self, error: &str) -> Arc<LoadedImage> {
        let image = LoadedImage::new("ERROR".to_string());
        image.on_load_fail(error.to_string());
        image
    }

    pub fn get_cached(&self, path: &str) -> Option<Arc<LoadedImage>> {
        self.cache
            .lock()
            .unwrap()
            .iter()
            .find(|img| img.path_matches(path))
            .cloned()
    }

    /// Updates cache entries when a file on disk was moved.
    pub fn notify_moved(&self, old_path: &str, new_path: &str) {
        for cached in self.cache.lock().unwrap().iter() {
            if cached.path_matches(old_path) {
                cached.on_moved(new_path);
            }
        }
    }

    /// Folder/collection icons rendered once on first use.
    pub fn resource_icons(&self) -> ResourceIcons {
        let mut icons = self.icons.lock().unwrap();
        if let Some(existing) = &*icons {
            return existing.clone();
        }

        let folder = Arc::new(DecodedImage::single(render_folder_icon()));
        let collection = Arc::new(DecodedImage::single(render_collection_icon()));

        let folder_as_image = LoadedImage::new("resource://icons/folder".into());
        folder_as_image.on_load_success(folder.clone());

        let created = ResourceIcons {
            folder_icon: folder,
            collection_icon: collection,
            folder_as_image,
        };
        *icons = Some(created.clone());
        created
    }

    /// Marks the worker tasks as quitting and wakes them.
    pub fn quit_processing(&self) {
        self.quitting.store(true, Ordering::Release);
        self.load_notify.notify_waiters();
        self.thumb_notify.notify_waiters();
        self.cleanup_notify.notify_waiters();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    // ─── Workers ──────────────────────────────────────────────────

    async fn run_full_size_loader(self: Arc<Self>) {
        while !self.quitting.load(Ordering::Acquire) {
            if self.load_queue.is_empty() {
                let _ = tokio::time::timeout(
                    Duration::from_millis(500),
                    self.load_notify.notified(),
                )
                .await;
                continue;
            }

            while let Some((image, handle)) = self.load_queue.pop() {
                if self.quitting.load(Ordering::Acquire) {
                    return;
                }

                let path = image.path();
                let decoded =
                    tokio::task::spawn_blocking(move || codec::decode_file(Path::new(&path)))
                        .await;

                match decoded {
                    Ok(Ok(frames)) => image.on_load_success(Arc::new(frames)),
                    Ok(Err(error)) => {
                        warn!("Image failed to open from {}: {error}", image.path());
                        image.on_load_fail(format!("Error Loading: {error}"));
                    }
                    Err(join_error) => {
                        image.on_load_fail(format!("Error Loading: decoder panicked: {join_error}"))
                    }
                }
                handle.mark_done();
            }
        }
    }

    async fn run_thumbnail_generator(self: Arc<Self>) {
        while !self.quitting.load(Ordering::Acquire) {
            if self.thumb_queue.is_empty() {
                let _ = tokio::time::timeout(
                    Duration::from_millis(500),
                    self.thumb_notify.notified(),
                )
                .await;
                continue;
            }

            while let Some(((image, hash), handle)) = self.thumb_queue.pop() {
                if self.quitting.load(Ordering::Acquire) {
                    return;
                }

                let dir = self.thumbnail_dir.clone();
                let background = self.background;
                let worker_image = image.clone();
                let result = tokio::task::spawn_blocking(move || {
                    thumbnailer::load_thumbnail(&dir, background, &worker_image, &hash)
                })
                .await;

                if let Err(join_error) = result {
                    image.on_load_fail(format!("thumbnail task panicked: {join_error}"));
                }
                handle.mark_done();
            }
        }
    }

    async fn run_cache_cleanup(self: Arc<Self>) {
        while !self.quitting.load(Ordering::Acquire) {
            let _ = tokio::time::timeout(
                CACHE_CLEANUP_INTERVAL,
                self.cleanup_notify.notified(),
            )
            .await;
            if self.quitting.load(Ordering::Acquire) {
                break;
            }
            self.cleanup_pass();
        }
    }

    fn cleanup_pass(&self) {
        let now = now_ms();
        let mut cache = self.cache.lock().unwrap();

        let idle_for = now - self.last_insert.load(Ordering::Acquire);
        let mut use_unload_anyway = idle_for > UNLOAD_ANYWAY_SECS * 1000;
        if use_unload_anyway {
            self.last_insert.store(now, Ordering::Release);
        }

        cache.retain(|image| {
            let age = now - image.last_used_ms();

            if Arc::strong_count(image) == 1 && age > UNLOAD_TIME_MS {
                return false;
            }
            if use_unload_anyway && age > UNLOAD_ANYWAY_SECS * 1000 {
                // Only one forced drop per idle cycle.
                use_unload_anyway = false;
                return false;
            }
            true
        });

        let mut unloads_remaining = MAX_FORCED_UNLOADS_PER_CYCLE;
        while cache.len() > MAX_CACHED_IMAGES && unloads_remaining > 0 {
            let oldest = cache
                .iter()
                .enumerate()
                .min_by_key(|(_, image)| image.last_used_ms())
                .map(|(index, _)| index);
            match oldest {
                Some(index) => {
                    cache.remove(index);
                }
                None => break,
            }
            unloads_remaining -= 1;
        }
    }
}

// Icons are rendered in code so there is no binary asset to ship.

fn render_folder_icon() -> RgbaImage {
    let mut icon = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
    let body = Rgba([222, 178, 87, 255]);
    let tab = Rgba([201, 155, 62, 255]);

    for y in 12..22 {
        for x in 4..30 {
            icon.put_pixel(x, y, tab);
        }
    }
    for y in 20..56 {
        for x in 4..60 {
            icon.put_pixel(x, y, body);
        }
    }
    icon
}

fn render_collection_icon() -> RgbaImage {
    let mut icon = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
    let shades = [
        Rgba([120, 144, 196, 255]),
        Rgba([96, 120, 180, 255]),
        Rgba([72, 96, 164, 255]),
    ];

    for (layer, colour) in shades.iter().enumerate() {
        let offset = (layer * 6) as u32;
        for y in (8 + offset)..(40 + offset) {
            for x in (8 + offset)..(40 + offset) {
                icon.put_pixel(x, y, *colour);
            }
        }
    }
    icon
}

#[cfg(test)]
#[path = "tests/image_cache_tests.rs"]
mod tests;
