//! Shared entity types backing the resource store.
//!
//! Each database row type has a plain `*Row` struct (what sqlx maps) and,
//! for the entities that participate in the single-load identity map, a
//! shared wrapper with interior mutability. Handing out `Arc`s of the
//! wrappers is what keeps two loads of the same id pointer-identical.

use std::sync::{Arc, RwLock};

use log::warn;
use serde::{Deserialize, Serialize};

pub type DbId = i64;

/// Timestamp format used for all date columns.
pub fn now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

// ─── Image ────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageRow {
    pub id: DbId,
    pub relative_path: String,
    pub width: i64,
    pub height: i64,
    pub name: String,
    pub extension: String,
    pub add_date: String,
    pub last_view: String,
    pub is_private: bool,
    pub from_file: String,
    pub file_hash: String,
    pub deleted: bool,
}

#[derive(Debug)]
struct ImageState {
    row: ImageRow,
    /// Runtime-only: set when a merge action folded this into another image.
    merged: bool,
    /// Lazily filled from the signature store. `None` = not fetched yet.
    signature: Option<Option<String>>,
}

/// A content-addressed image file known to the store.
#[derive(Debug)]
pub struct Image {
    pub id: DbId,
    state: RwLock<ImageState>,
}

impl Image {
    pub fn from_row(row: ImageRow) -> Arc<Self> {
        Arc::new(Self {
            id: row.id,
            state: RwLock::new(ImageState {
                row,
                merged: false,
                signature: None,
            }),
        })
    }

    pub fn row(&self) -> ImageRow {
        self.state.read().unwrap().row.clone()
    }

    pub fn relative_path(&self) -> String {
        self.state.read().unwrap().row.relative_path.clone()
    }

    pub fn set_relative_path(&self, path: String) {
        self.state.write().unwrap().row.relative_path = path;
    }

    pub fn name(&self) -> String {
        self.state.read().unwrap().row.name.clone()
    }

    pub fn extension(&self) -> String {
        self.state.read().unwrap().row.extension.clone()
    }

    /// Empty until hash calculation has completed; permanent afterwards.
    pub fn file_hash(&self) -> String {
        self.state.read().unwrap().row.file_hash.clone()
    }

    pub fn set_file_hash(&self, hash: String) {
        let mut state = self.state.write().unwrap();
        if !state.row.file_hash.is_empty() && state.row.file_hash != hash {
            warn!(
                "Image {}: replacing already calculated hash {} with {}",
                state.row.id, state.row.file_hash, hash
            );
        }
        state.row.file_hash = hash;
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().unwrap().row.deleted
    }

    pub fn set_deleted(&self, deleted: bool) {
        self.state.write().unwrap().row.deleted = deleted;
    }

    pub fn is_merged(&self) -> bool {
        self.state.read().unwrap().merged
    }

    pub fn set_merged(&self, merged: bool) {
        self.state.write().unwrap().merged = merged;
    }

    pub fn is_private(&self) -> bool {
        self.state.read().unwrap().row.is_private
    }

    pub fn touch_last_view(&self) {
        self.state.write().unwrap().row.last_view = now_stamp();
    }

    pub fn cached_signature(&self) -> Option<Option<String>> {
        self.state.read().unwrap().signature.clone()
    }

    pub fn set_cached_signature(&self, signature: Option<String>) {
        self.state.write().unwrap().signature = Some(signature);
    }

    pub fn apply_row(&self, row: ImageRow) {
        self.state.write().unwrap().row = row;
    }
}

// ─── Collection ───────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRow {
    pub id: DbId,
    pub name: String,
    pub is_private: bool,
    pub add_date: String,
    pub modify_date: String,
    pub last_view: String,
    pub preview_image: Option<DbId>,
    pub deleted: bool,
}

/// An ordered bag of images with a case-insensitively unique name.
#[derive(Debug)]
pub struct Collection {
    pub id: DbId,
    state: RwLock<CollectionRow>,
}

impl Collection {
    pub fn from_row(row: CollectionRow) -> Arc<Self> {
        Arc::new(Self {
            id: row.id,
            state: RwLock::new(row),
        })
    }

    pub fn row(&self) -> CollectionRow {
        self.state.read().unwrap().clone()
    }

    pub fn name(&self) -> String {
        self.state.read().unwrap().name.clone()
    }

    pub fn set_name(&self, name: String) {
        let mut state = self.state.write().unwrap();
        state.name = name;
        state.modify_date = now_stamp();
    }

    pub fn is_private(&self) -> bool {
        self.state.read().unwrap().is_private
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().unwrap().deleted
    }

    pub fn set_deleted(&self, deleted: bool) {
        self.state.write().unwrap().deleted = deleted;
    }

    pub fn preview_image(&self) -> Option<DbId> {
        self.state.read().unwrap().preview_image
    }

    pub fn set_preview_image(&self, image: Option<DbId>) {
        self.state.write().unwrap().preview_image = image;
    }

    pub fn touch_last_view(&self) {
        self.state.write().unwrap().last_view = now_stamp();
    }
}

// ─── Folder ───────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FolderRow {
    pub id: DbId,
    pub name: String,
    pub is_private: bool,
    pub deleted: bool,
}

/// Hierarchical container for collections and sub-folders.
#[derive(Debug)]
pub struct Folder {
    pub id: DbId,
    state: RwLock<FolderRow>,
}

impl Folder {
    pub fn from_row(row: FolderRow) -> Arc<Self> {
        Arc::new(Self {
            id: row.id,
            state: RwLock::new(row),
        })
    }

    pub fn row(&self) -> FolderRow {
        self.state.read().unwrap().clone()
    }

    pub fn name(&self) -> String {
        self.state.read().unwrap().name.clone()
    }

    pub fn set_name(&self, name: String) {
        self.state.write().unwrap().name = name;
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().unwrap().deleted
    }
}

// ─── Tags ─────────────────────────────────────────────────────────

/// Rough grouping of what a tag describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum TagCategory {
    DescribeCharacterObject = 0,
    QualityLevel = 1,
    Meta = 2,
    Action = 3,
    Scene = 4,
    Character = 5,
    Author = 6,
}

impl TagCategory {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::DescribeCharacterObject),
            1 => Some(Self::QualityLevel),
            2 => Some(Self::Meta),
            3 => Some(Self::Action),
            4 => Some(Self::Scene),
            5 => Some(Self::Character),
            6 => Some(Self::Author),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRow {
    pub id: DbId,
    pub name: String,
    pub category: i64,
    pub description: String,
    pub is_private: bool,
    pub deleted: bool,
}

#[derive(Debug)]
pub struct Tag {
    pub id: DbId,
    state: RwLock<TagRow>,
}

impl Tag {
    pub fn from_row(row: TagRow) -> Arc<Self> {
        Arc::new(Self {
            id: row.id,
            state: RwLock::new(row),
        })
    }

    pub fn row(&self) -> TagRow {
        self.state.read().unwrap().clone()
    }

    pub fn name(&self) -> String {
        self.state.read().unwrap().name.clone()
    }

    pub fn set_name(&self, name: String) {
        self.state.write().unwrap().name = name;
    }

    pub fn category(&self) -> TagCategory {
        TagCategory::from_i64(self.state.read().unwrap().category)
            .unwrap_or(TagCategory::DescribeCharacterObject)
    }

    pub fn description(&self) -> String {
        self.state.read().unwrap().description.clone()
    }

    pub fn is_private(&self) -> bool {
        self.state.read().unwrap().is_private
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().unwrap().deleted
    }
}

/// Adverb-like prefix placed before a tag, like the "red" in "red flower".
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagModifier {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub deleted: bool,
}

impl PartialEq for TagModifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Result of applying a break rule to a user string.
#[derive(Debug, Clone)]
pub struct BrokenTag {
    pub tag: Option<Arc<Tag>>,
    pub modifiers: Vec<TagModifier>,
}

/// Pattern (literal or with a single `*`) that resolves a free-text
/// fragment into a tag plus a modifier set.
#[derive(Debug, Clone)]
pub struct TagBreakRule {
    pub id: DbId,
    pub pattern: String,
    pub actual_tag: Option<Arc<Tag>>,
    pub modifiers: Vec<TagModifier>,
}

impl TagBreakRule {
    /// Breaks a string according to this rule. `None` when the rule does
    /// not match.
    pub fn do_break(&self, input: &str) -> Option<BrokenTag> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if !self.pattern.contains('*') {
            if !self.pattern.eq_ignore_ascii_case(input) {
                return None;
            }
            let tag = match &self.actual_tag {
                Some(tag) => tag.clone(),
                None => {
                    warn!("Full matching break rule {} has no tag", self.pattern);
                    return None;
                }
            };
            return Some(BrokenTag {
                tag: Some(tag),
                modifiers: self.modifiers.clone(),
            });
        }

        let parts: Vec<&str> = self.pattern.splitn(2, '*').collect();
        let literal = if parts[0].is_empty() {
            parts.get(1).copied().unwrap_or("")
        } else {
            parts[0]
        };

        if !literal.trim().eq_ignore_ascii_case(input) {
            return None;
        }

        Some(BrokenTag {
            tag: self.actual_tag.clone(),
            modifiers: self.modifiers.clone(),
        })
    }
}

/// A concrete tag instance: main tag, ordered modifiers and optionally a
/// combined-with partner forming structures like "hair on face".
#[derive(Debug, Clone)]
pub struct AppliedTagData {
    pub tag: Arc<Tag>,
    pub modifiers: Vec<TagModifier>,
    pub combined: Option<(String, Box<AppliedTagData>)>,
}

impl AppliedTagData {
    pub fn simple(tag: Arc<Tag>) -> Self {
        Self {
            tag,
            modifiers: Vec::new(),
            combined: None,
        }
    }

    pub fn with_modifiers(tag: Arc<Tag>, modifiers: Vec<TagModifier>) -> Self {
        Self {
            tag,
            modifiers,
            combined: None,
        }
    }

    pub fn tag_name(&self) -> String {
        self.tag.name()
    }

    pub fn set_combine_with(&mut self, word: String, right: AppliedTagData) {
        self.combined = Some((word, Box::new(right)));
    }

    /// Text form that parses back to an equal value.
    pub fn to_accurate_string(&self) -> String {
        let mut result = String::new();
        for modifier in &self.modifiers {
            result.push_str(&modifier.name);
            result.push(' ');
        }
        result.push_str(&self.tag.name());
        if let Some((word, right)) = &self.combined {
            result.push(' ');
            result.push_str(word);
            result.push(' ');
            result.push_str(&right.to_accurate_string());
        }
        result
    }

    pub fn is_same(&self, other: &AppliedTagData) -> bool {
        if self.tag.name() != other.tag.name() {
            return false;
        }
        if self.modifiers != other.modifiers {
            return false;
        }
        match (&self.combined, &other.combined) {
            (None, None) => true,
            (Some((word_a, right_a)), Some((word_b, right_b))) => {
                word_a == word_b && right_a.is_same(right_b)
            }
            _ => false,
        }
    }

    /// True if any tag or modifier involved has been soft-deleted.
    pub fn has_deleted_parts(&self) -> bool {
        if self.tag.is_deleted() {
            return true;
        }
        if self.modifiers.iter().any(|m| m.deleted) {
            return true;
        }
        match &self.combined {
            Some((_, right)) => right.has_deleted_parts(),
            None => false,
        }
    }
}

// ─── Net gallery / net file ───────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NetGalleryRow {
    pub id: DbId,
    pub gallery_url: String,
    pub target_path: String,
    pub gallery_name: String,
    pub currently_scanned: String,
    pub is_downloaded: bool,
    pub tags_string: String,
    pub deleted: bool,
}

/// A pending download batch.
#[derive(Debug)]
pub struct NetGallery {
    pub id: DbId,
    state: RwLock<NetGalleryRow>,
}

impl NetGallery {
    pub fn from_row(row: NetGalleryRow) -> Arc<Self> {
        Arc::new(Self {
            id: row.id,
            state: RwLock::new(row),
        })
    }

    pub fn row(&self) -> NetGalleryRow {
        self.state.read().unwrap().clone()
    }

    pub fn gallery_url(&self) -> String {
        self.state.read().unwrap().gallery_url.clone()
    }

    pub fn is_downloaded(&self) -> bool {
        self.state.read().unwrap().is_downloaded
    }

    pub fn set_downloaded(&self, downloaded: bool) {
        self.state.write().unwrap().is_downloaded = downloaded;
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().unwrap().deleted
    }

    pub fn set_deleted(&self, deleted: bool) {
        self.state.write().unwrap().deleted = deleted;
    }
}

/// A single file inside a download batch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NetFileRow {
    pub id: DbId,
    pub file_url: String,
    pub page_referrer: String,
    pub preferred_name: String,
    pub tags_list: String,
    pub belongs_to_gallery: DbId,
}
