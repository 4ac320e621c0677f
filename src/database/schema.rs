//! Table structure and seed rows for a freshly created database.

/// Main database tables. Executed inside one transaction on first open.
pub const MAIN_TABLES_SQL: &str = r#"
CREATE TABLE version (
    number INTEGER NOT NULL
);

CREATE TABLE pictures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    relative_path TEXT NOT NULL,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    extension TEXT NOT NULL DEFAULT '',
    add_date TEXT NOT NULL,
    last_view TEXT NOT NULL,
    is_private INTEGER NOT NULL DEFAULT 0,
    from_file TEXT NOT NULL DEFAULT '',
    file_hash TEXT NOT NULL DEFAULT '',
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX pictures_live_hash
    ON pictures (file_hash) WHERE deleted = 0 AND file_hash != '';

CREATE TABLE collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_private INTEGER NOT NULL DEFAULT 0,
    add_date TEXT NOT NULL,
    modify_date TEXT NOT NULL,
    last_view TEXT NOT NULL,
    preview_image INTEGER REFERENCES pictures (id) ON DELETE SET NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX collections_name_nocase ON collections (name COLLATE NOCASE);

CREATE TABLE collection_image (
    collection INTEGER NOT NULL REFERENCES collections (id) ON DELETE CASCADE,
    image INTEGER NOT NULL REFERENCES pictures (id) ON DELETE CASCADE,
    show_order INTEGER NOT NULL,
    PRIMARY KEY (collection, image)
);

CREATE TABLE virtual_folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_private INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE folder_collection (
    parent INTEGER NOT NULL REFERENCES virtual_folders (id) ON DELETE CASCADE,
    child INTEGER NOT NULL REFERENCES collections (id) ON DELETE CASCADE,
    PRIMARY KEY (parent, child)
);

CREATE TABLE folder_folder (
    parent INTEGER NOT NULL REFERENCES virtual_folders (id) ON DELETE CASCADE,
    child INTEGER NOT NULL REFERENCES virtual_folders (id) ON DELETE CASCADE,
    PRIMARY KEY (parent, child)
);

CREATE TABLE tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    category INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL DEFAULT '',
    is_private INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE tag_aliases (
    name TEXT NOT NULL UNIQUE,
    meant_tag INTEGER NOT NULL REFERENCES tags (id) ON DELETE CASCADE
);

CREATE TABLE tag_implies (
    primary_tag INTEGER NOT NULL REFERENCES tags (id) ON DELETE CASCADE,
    to_apply INTEGER NOT NULL REFERENCES tags (id) ON DELETE CASCADE,
    PRIMARY KEY (primary_tag, to_apply)
);

CREATE TABLE tag_modifiers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    is_private INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE applied_tag (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag INTEGER NOT NULL REFERENCES tags (id) ON DELETE RESTRICT
);

CREATE TABLE applied_tag_modifier (
    to_tag INTEGER NOT NULL REFERENCES applied_tag (id) ON DELETE CASCADE,
    modifier INTEGER NOT NULL REFERENCES tag_modifiers (id) ON DELETE RESTRICT,
    PRIMARY KEY (to_tag, modifier)
);

CREATE TABLE applied_tag_combine (
    tag_left INTEGER NOT NULL REFERENCES applied_tag (id) ON DELETE CASCADE,
    tag_right INTEGER NOT NULL REFERENCES applied_tag (id) ON DELETE CASCADE,
    combined_with TEXT NOT NULL,
    PRIMARY KEY (tag_left, tag_right)
);

CREATE TABLE image_tag (
    image INTEGER NOT NULL REFERENCES pictures (id) ON DELETE CASCADE,
    tag INTEGER NOT NULL REFERENCES applied_tag (id) ON DELETE CASCADE,
    PRIMARY KEY (image, tag)
);

CREATE TABLE collection_tag (
    collection INTEGER NOT NULL REFERENCES collections (id) ON DELETE CASCADE,
    tag INTEGER NOT NULL REFERENCES applied_tag (id) ON DELETE CASCADE,
    PRIMARY KEY (collection, tag)
);

CREATE TABLE common_composite_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_string TEXT NOT NULL UNIQUE,
    actual_tag INTEGER REFERENCES tags (id) ON DELETE CASCADE
);

CREATE TABLE composite_tag_modifiers (
    composite INTEGER NOT NULL REFERENCES common_composite_tags (id) ON DELETE CASCADE,
    modifier INTEGER NOT NULL REFERENCES tag_modifiers (id) ON DELETE RESTRICT,
    PRIMARY KEY (composite, modifier)
);

CREATE TABLE tag_super_aliases (
    alias TEXT NOT NULL UNIQUE,
    expanded TEXT NOT NULL
);

CREATE TABLE net_gallery (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    gallery_url TEXT NOT NULL,
    target_path TEXT NOT NULL DEFAULT '',
    gallery_name TEXT NOT NULL DEFAULT '',
    currently_scanned TEXT NOT NULL DEFAULT '',
    is_downloaded INTEGER NOT NULL DEFAULT 0,
    tags_string TEXT NOT NULL DEFAULT '',
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE net_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_url TEXT NOT NULL,
    page_referrer TEXT NOT NULL DEFAULT '',
    preferred_name TEXT NOT NULL DEFAULT '',
    tags_list TEXT NOT NULL DEFAULT '',
    belongs_to_gallery INTEGER NOT NULL REFERENCES net_gallery (id) ON DELETE CASCADE
);

CREATE TABLE actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type INTEGER NOT NULL,
    performed INTEGER NOT NULL DEFAULT 0,
    json_data TEXT NOT NULL DEFAULT '{}',
    description TEXT NOT NULL DEFAULT '',
    create_time TEXT NOT NULL
);
"#;

/// Signature database tables (auxiliary file).
pub const SIGNATURE_TABLES_SQL: &str = r#"
CREATE TABLE version (
    number INTEGER NOT NULL
);

CREATE TABLE pictures_signature (
    picture_id INTEGER PRIMARY KEY,
    signature TEXT NOT NULL
);

CREATE TABLE picture_signature_words (
    picture_id INTEGER NOT NULL,
    word_index INTEGER NOT NULL,
    sig_word TEXT NOT NULL,
    PRIMARY KEY (picture_id, word_index)
);

CREATE INDEX picture_signature_words_by_word
    ON picture_signature_words (sig_word);
"#;
