//! Reversible database actions.
//!
//! Every destructive user operation is recorded as an action row holding
//! a JSON payload that is enough to reverse it later, also across
//! sessions. `redo` performs (or re-performs) the operation, `undo`
//! reverses it, and `purge` applies the irreversible side effects once
//! the action falls out of history.

pub mod history;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::database::{
    action_repo, collection_repo, image_repo, net_repo, tag_repo, Store,
    UNCATEGORIZED_COLLECTION_ID,
};
use crate::services::config::Settings;
use crate::services::paths;
use crate::services::tags;
use crate::types::models::DbId;
use crate::types::{StoreError, StoreResult};

/// Stable discriminants stored in the actions table. Zero is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ActionType {
    ImageDelete = 1,
    ImageMerge = 2,
    ImageDeleteFromCollection = 3,
    CollectionReorder = 4,
    NetGalleryDelete = 5,
    CollectionDelete = 6,
}

impl ActionType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::ImageDelete),
            2 => Some(Self::ImageMerge),
            3 => Some(Self::ImageDeleteFromCollection),
            4 => Some(Self::CollectionReorder),
            5 => Some(Self::NetGalleryDelete),
            6 => Some(Self::CollectionDelete),
            _ => None,
        }
    }
}

// Payloads deserialize with defaults so rows written by other versions
// with extra keys still load.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageDeletePayload {
    pub images: Vec<DbId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCollectionEntry {
    pub collection: DbId,
    pub order: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMergePayload {
    pub target: DbId,
    pub images: Vec<DbId>,
    /// Tag strings copied onto the target, captured at first redo.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Collections the target was added to, captured at first redo.
    #[serde(default)]
    pub collections: Vec<MergeCollectionEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageDeleteFromCollectionPayload {
    pub collection: DbId,
    pub images: Vec<DbId>,
    /// Original show orders, captured at first redo.
    #[serde(default)]
    pub orders: Vec<i64>,
    /// Images this action itself parented to Uncategorized; undo removes
    /// exactly these links and no others.
    #[serde(default)]
    pub added_to_uncategorized: Vec<DbId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionReorderPayload {
    pub collection: DbId,
    pub old_order: Vec<DbId>,
    pub new_order: Vec<DbId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetGalleryDeletePayload {
    pub gallery: DbId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDeletePayload {
    pub collection: DbId,
}

#[derive(Debug, Clone)]
pub enum HistoryAction {
    ImageDelete(ImageDeletePayload),
    ImageMerge(ImageMergePayload),
    ImageDeleteFromCollection(ImageDeleteFromCollectionPayload),
    CollectionReorder(CollectionReorderPayload),
    NetGalleryDelete(NetGalleryDeletePayload),
    CollectionDelete(CollectionDeletePayload),
}

impl HistoryAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::ImageDelete(_) => ActionType::ImageDelete,
            Self::ImageMerge(_) => ActionType::ImageMerge,
            Self::ImageDeleteFromCollection(_) => ActionType::ImageDeleteFromCollection,
            Self::CollectionReorder(_) => ActionType::CollectionReorder,
            Self::NetGalleryDelete(_) => ActionType::NetGalleryDelete,
            Self::CollectionDelete(_) => ActionType::CollectionDelete,
        }
    }

    pub fn serialize_payload(&self) -> String {
        let result = match self {
            Self::ImageDelete(p) => serde_json::to_string(p),
            Self::ImageMerge(p) => serde_json::to_string(p),
            Self::ImageDeleteFromCollection(p) => serde_json::to_string(p),
            Self::CollectionReorder(p) => serde_json::to_string(p),
            Self::NetGalleryDelete(p) => serde_json::to_string(p),
            Self::CollectionDelete(p) => serde_json::to_string(p),
        };
        result.unwrap_or_else(|e| {
            error!("Failed to serialize action payload: {e}");
            "{}".to_string()
        })
    }

    /// Reconstitutes an action from its stored row.
    pub fn from_stored(action_type: i64, json_data: &str) -> StoreResult<HistoryAction> {
        let parse_error =
            |e: serde_json::Error| StoreError::InvalidArgument(format!("invalid json: {e}"));

        match ActionType::from_i64(action_type) {
            Some(ActionType::ImageDelete) => Ok(Self::ImageDelete(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            Some(ActionType::ImageMerge) => Ok(Self::ImageMerge(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            Some(ActionType::ImageDeleteFromCollection) => Ok(Self::ImageDeleteFromCollection(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            Some(ActionType::CollectionReorder) => Ok(Self::CollectionReorder(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            Some(ActionType::NetGalleryDelete) => Ok(Self::NetGalleryDelete(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            Some(ActionType::CollectionDelete) => Ok(Self::CollectionDelete(
                serde_json::from_str(json_data).map_err(parse_error)?,
            )),
            None => Err(StoreError::InvalidArgument(format!(
                "unknown action type: {action_type}"
            ))),
        }
    }

    pub fn generate_description(&self) -> String {
        match self {
            Self::ImageDelete(p) => {
                if p.images.len() > 1 {
                    format!("Deleted {} images", p.images.len())
                } else {
                    "Deleted an image".to_string()
                }
            }
            Self::ImageMerge(p) => {
                if p.images.len() != 1 {
                    format!("Merged {} images into {}", p.images.len(), p.target)
                } else {
                    format!("Merged an image into {}", p.target)
                }
            }
            Self::ImageDeleteFromCollection(p) => {
                format!(
                    "Removed {} image(s) from collection {}",
                    p.images.len(),
                    p.collection
                )
            }
            Self::CollectionReorder(p) => format!("Reordered collection {}", p.collection),
            Self::NetGalleryDelete(p) => format!("Deleted download gallery {}", p.gallery),
            Self::CollectionDelete(p) => format!("Deleted collection {}", p.collection),
        }
    }
}

/// An action persisted in the journal, with its live performed flag.
#[derive(Debug)]
pub struct RecordedAction {
    pub id: DbId,
    performed: AtomicBool,
    description: String,
    action: Mutex<HistoryAction>,
}

impl RecordedAction {
    pub fn new(id: DbId, description: String, action: HistoryAction) -> Self {
        Self {
            id,
            performed: AtomicBool::new(false),
            description,
            action: Mutex::new(action),
        }
    }

    /// Reconstitutes a recorded action from its database row.
    pub fn from_row(row: &action_repo::ActionRow) -> StoreResult<Self> {
        let action = HistoryAction::from_stored(row.action_type, &row.json_data)?;
        let recorded = Self::new(row.id, row.description.clone(), action);
        recorded.performed.store(row.performed, Ordering::Release);
        Ok(recorded)
    }

    pub fn is_performed(&self) -> bool {
        self.performed.load(Ordering::Acquire)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn action(&self) -> HistoryAction {
        self.action.lock().unwrap().clone()
    }

    /// Applies the action. SQL failures are logged and reported as
    /// `Ok(false)` with the performed flag untouched.
    pub async fn redo(&self, store: &Store, conn: &mut SqliteConnection) -> StoreResult<bool> {
        if self.is_performed() {
            return Ok(false);
        }

        let mut action = self.action.lock().unwrap().clone();
        match apply_redo(store, conn, &mut action).await {
            Ok(()) => {}
            Err(StoreError::Sql { code, message }) => {
                warn!("Error in action redo ({code}): {message}");
                return Ok(false);
            }
            Err(other) => return Err(other),
        }

        *self.action.lock().unwrap() = action.clone();
        self.performed.store(true, Ordering::Release);
        action_repo::update_action(
            conn,
            self.id,
            true,
            &action.serialize_payload(),
            &self.description,
        )
        .await?;
        Ok(true)
    }

    /// Reverses the action. SQL failures are logged and reported as
    /// `Ok(false)` with the performed flag untouched.
    pub async fn undo(&self, store: &Store, conn: &mut SqliteConnection) -> StoreResult<bool> {
        if !self.is_performed() {
            return Ok(false);
        }

        let action = self.action.lock().unwrap().clone();
        match apply_undo(store, conn, &action).await {
            Ok(()) => {}
            Err(StoreError::Sql { code, message }) => {
                warn!("Error in action undo ({code}): {message}");
                return Ok(false);
            }
            Err(other) => return Err(other),
        }

        self.performed.store(false, Ordering::Release);
        action_repo::set_action_performed(conn, self.id, false).await?;
        Ok(true)
    }

    /// Permanently applies side effects and removes the journal row. An
    /// undone action takes no side effects.
    pub async fn purge(
        &self,
        store: &Store,
        conn: &mut SqliteConnection,
        settings: &Settings,
    ) -> StoreResult<()> {
        if self.is_performed() {
            let action = self.action.lock().unwrap().clone();
            apply_purge(store, conn, settings, &action).await?;
        }
        action_repo::delete_action(conn, self.id).await?;
        Ok(())
    }
}

// ─── Redo ─────────────────────────────────────────────────────────

async fn apply_redo(
    store: &Store,
    conn: &mut SqliteConnection,
    action: &mut HistoryAction,
) -> StoreResult<()> {
    match action {
        HistoryAction::ImageDelete(payload) => {
            for &image in &payload.images {
                image_repo::set_image_deleted(store, conn, image, true).await?;
            }
            Ok(())
        }
        HistoryAction::ImageMerge(payload) => redo_image_merge(store, conn, payload).await,
        HistoryAction::ImageDeleteFromCollection(payload) => {
            redo_delete_from_collection(conn, payload).await
        }
        HistoryAction::CollectionReorder(payload) => {
            collection_repo::apply_collection_order(conn, payload.collection, &payload.new_order)
                .await
        }
        HistoryAction::NetGalleryDelete(payload) => {
            net_repo::set_net_gallery_deleted(store, conn, payload.gallery, true).await
        }
        HistoryAction::CollectionDelete(payload) => {
            collection_repo::set_collection_deleted(store, conn, payload.collection, true).await
        }
    }
}

async fn redo_image_merge(
    store: &Store,
    conn: &mut SqliteConnection,
    payload: &mut ImageMergePayload,
) -> StoreResult<()> {
    let target = image_repo::select_image_by_id(store, conn, payload.target)
        .await?
        .ok_or_else(|| {
            StoreError::InvalidState(format!("merge target {} is not in the store", payload.target))
        })?;

    // First redo captures exactly what gets added so undo can reverse it
    // without guessing.
    if payload.tags.is_empty() && payload.collections.is_empty() {
        let target_tags = tag_repo::select_image_tags(store, conn, payload.target).await?;

        for &source in &payload.images {
            for tag in tag_repo::select_image_tags(store, conn, source).await? {
                let duplicate = target_tags.iter().any(|existing| existing.is_same(&tag));
                let text = tag.to_accurate_string();
                if !duplicate && !payload.tags.contains(&text) {
                    payload.tags.push(text);
                }
            }
        }

        let target_collections: Vec<DbId> =
            collection_repo::select_collection_ids_image_is_in(conn, payload.target)
                .await?
                .into_iter()
                .map(|(collection, _)| collection)
                .collect();

        for &source in &payload.images {
            for (collection, order) in
                collection_repo::select_collection_ids_image_is_in(conn, source).await?
            {
                let already = target_collections.contains(&collection)
                    || payload.collections.iter().any(|c| c.collection == collection);
                if !already {
                    payload
                        .collections
                        .push(MergeCollectionEntry { collection, order });
                }
            }
        }
    }

    for text in &payload.tags {
        match tags::parse_tag(store, conn, text).await {
            Ok(tag) => {
                tag_repo::insert_image_tag(store, conn, payload.target, &tag).await?;
            }
            Err(e) => warn!("Merge couldn't reapply tag '{text}': {e}"),
        }
    }

    for entry in &payload.collections {
        collection_repo::insert_image_to_collection(
            conn,
            entry.collection,
            payload.target,
            entry.order,
        )
        .await?;
    }

    for &source in &payload.images {
        image_repo::set_image_deleted(store, conn, source, true).await?;
        if let Some(image) = image_repo::select_image_by_id(store, conn, source).await? {
            image.set_merged(true);
        }
    }

    // Merging into a deleted target makes no sense; make sure it stays
    // visible.
    if target.is_deleted() {
        image_repo::set_image_deleted(store, conn, payload.target, false).await?;
    }

    Ok(())
}

async fn redo_delete_from_collection(
    conn: &mut SqliteConnection,
    payload: &mut ImageDeleteFromCollectionPayload,
) -> StoreResult<()> {
    if payload.orders.len() != payload.images.len() {
        payload.orders.clear();
        for &image in &payload.images {
            payload
                .orders
                .push(collection_repo::select_image_show_order(conn, payload.collection, image).await?);
        }
    }

    payload.added_to_uncategorized.clear();

    for &image in &payload.images {
        collection_repo::delete_image_from_collection(conn, payload.collection, image).await?;
    }

    for &image in &payload.images {
        if collection_repo::add_to_uncategorized_if_orphaned(conn, image).await? {
            payload.added_to_uncategorized.push(image);
        }
    }

    Ok(())
}

// ─── Undo ─────────────────────────────────────────────────────────

async fn apply_undo(
    store: &Store,
    conn: &mut SqliteConnection,
    action: &HistoryAction,
) -> StoreResult<()> {
    match action {
        HistoryAction::ImageDelete(payload) => {
            for &image in &payload.images {
                image_repo::set_image_deleted(store, conn, image, false).await?;
            }
            Ok(())
        }
        HistoryAction::ImageMerge(payload) => undo_image_merge(store, conn, payload).await,
        HistoryAction::ImageDeleteFromCollection(payload) => {
            undo_delete_from_collection(conn, payload).await
        }
        HistoryAction::CollectionReorder(payload) => {
            collection_repo::apply_collection_order(conn, payload.collection, &payload.old_order)
                .await
        }
        HistoryAction::NetGalleryDelete(payload) => {
            net_repo::set_net_gallery_deleted(store, conn, payload.gallery, false).await
        }
        HistoryAction::CollectionDelete(payload) => {
            collection_repo::set_collection_deleted(store, conn, payload.collection, false).await
        }
    }
}

async fn undo_image_merge(
    store: &Store,
    conn: &mut SqliteConnection,
    payload: &ImageMergePayload,
) -> StoreResult<()> {
    for text in &payload.tags {
        match tags::parse_tag(store, conn, text).await {
            Ok(tag) => {
                tag_repo::delete_image_tag(store, conn, payload.target, &tag).await?;
            }
            Err(e) => warn!("Merge undo couldn't remove tag '{text}': {e}"),
        }
    }

    for entry in &payload.collections {
        collection_repo::delete_image_from_collection(conn, entry.collection, payload.target)
            .await?;
    }
    collection_repo::add_to_uncategorized_if_orphaned(conn, payload.target).await?;

    for &source in &payload.images {
        image_repo::set_image_deleted(store, conn, source, false).await?;
        if let Some(image) = image_repo::select_image_by_id(store, conn, source).await? {
            image.set_merged(false);
        }
    }

    Ok(())
}

async fn undo_delete_from_collection(
    conn: &mut SqliteConnection,
    payload: &ImageDeleteFromCollectionPayload,
) -> StoreResult<()> {
    for (index, &image) in payload.images.iter().enumerate() {
        let order = payload.orders.get(index).copied().unwrap_or(-1);
        if order >= 0 {
            collection_repo::insert_image_to_collection(conn, payload.collection, image, order)
                .await?;
        }
    }

    // Only remove Uncategorized links this same action inserted; being
    // reversed, the re-parenting must not stick.
    for &image in &payload.added_to_uncategorized {
        collection_repo::delete_image_from_collection(conn, UNCATEGORIZED_COLLECTION_ID, image)
            .await?;
    }

    Ok(())
}

// ─── Purge ────────────────────────────────────────────────────────

async fn apply_purge(
    store: &Store,
    conn: &mut SqliteConnection,
    settings: &Settings,
    action: &HistoryAction,
) -> StoreResult<()> {
    match action {
        HistoryAction::ImageDelete(payload) => {
            purge_images_with_files(store, conn, settings, &payload.images).await
        }
        HistoryAction::ImageMerge(payload) => {
            purge_images_with_files(store, conn, settings, &payload.images).await
        }
        HistoryAction::NetGalleryDelete(payload) => {
            net_repo::purge_net_gallery(store, conn, payload.gallery).await
        }
        HistoryAction::CollectionDelete(payload) => {
            // Contained images move to Uncategorized before the row goes
            // away for good.
            let contents =
                collection_repo::select_image_ids_and_show_order(conn, payload.collection).await?;
            for (image, _) in contents {
                collection_repo::delete_image_from_collection(conn, payload.collection, image)
                    .await?;
                collection_repo::add_to_uncategorized_if_orphaned(conn, image).await?;
            }
            collection_repo::purge_collection(store, conn, payload.collection).await
        }
        HistoryAction::ImageDeleteFromCollection(_) | HistoryAction::CollectionReorder(_) => {
            Ok(())
        }
    }
}

async fn purge_images_with_files(
    store: &Store,
    conn: &mut SqliteConnection,
    settings: &Settings,
    images: &[DbId],
) -> StoreResult<()> {
    let stored_paths = image_repo::select_image_paths(conn, images).await?;
    image_repo::purge_images(store, conn, images).await?;

    for stored in stored_paths {
        let final_path = paths::to_final_path(settings, &stored);
        if final_path.as_os_str().is_empty() || !final_path.exists() {
            continue;
        }
        match std::fs::remove_file(&final_path) {
            Ok(()) => info!("Purged image file: {:?}", final_path),
            Err(e) => error!("Failed to delete purged image file {:?}: {e}", final_path),
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
