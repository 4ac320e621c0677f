//! The durable resource store.
//!
//! All state lives in a SQLite file plus an auxiliary signature database.
//! Repo modules expose their operations as free functions in two shapes:
//! one taking `&mut SqliteConnection` so a caller already inside a
//! transaction can reuse it, and where services need it a `*_pooled`
//! wrapper that acquires a connection first. The pool is capped at one
//! connection, which is what serialises writers.

pub mod action_repo;
pub mod collection_repo;
pub mod folder_repo;
pub mod image_repo;
pub mod net_repo;
pub mod schema;
pub mod signature_repo;
pub mod single_load;
pub mod tag_repo;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{error, info};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::services::config::Settings;
use crate::services::events::ChangeBus;
use crate::types::models::{Collection, Folder, Image, NetGallery, Tag};
use crate::types::{StoreError, StoreResult};
use single_load::SingleLoad;

/// Version of the main database schema.
pub const DATABASE_CURRENT_VERSION: i64 = 2;

/// Version of the signature database schema.
pub const DATABASE_CURRENT_SIGNATURES_VERSION: i64 = 1;

/// The sentinel collection that holds images belonging to no collection.
/// Seeded first so it always gets this id.
pub const UNCATEGORIZED_COLLECTION_ID: i64 = 1;

/// The well-known root folder.
pub const ROOT_FOLDER_ID: i64 = 1;

pub struct Store {
    pool: SqlitePool,
    signature_pool: SqlitePool,
    db_file: Option<PathBuf>,
    pub events: ChangeBus,
    actions_to_keep: AtomicU32,

    pub(crate) loaded_images: SingleLoad<Image>,
    pub(crate) loaded_collections: SingleLoad<Collection>,
    pub(crate) loaded_folders: SingleLoad<Folder>,
    pub(crate) loaded_tags: SingleLoad<Tag>,
    pub(crate) loaded_galleries: SingleLoad<NetGallery>,
}

impl Store {
    /// Opens (or creates) the store under the configured database folder.
    /// Older files are migrated after a backup copy is taken; newer files
    /// are rejected.
    pub async fn open(settings: &Settings) -> StoreResult<Arc<Store>> {
        settings.ensure_folders_exist()?;

        let db_file = settings.database_file();
        let main_options = SqliteConnectOptions::new()
            .filename(&db_file)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Delete);
        let signature_options = SqliteConnectOptions::new()
            .filename(settings.signatures_file())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        Self::open_with(main_options, signature_options, Some(db_file)).await
    }

    /// In-memory store for tests. Single connection, so every query sees
    /// the same database.
    pub async fn open_in_memory() -> StoreResult<Arc<Store>> {
        let main_options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let signature_options = SqliteConnectOptions::new().in_memory(true);

        Self::open_with(main_options, signature_options, None).await
    }

    async fn open_with(
        main_options: SqliteConnectOptions,
        signature_options: SqliteConnectOptions,
        db_file: Option<PathBuf>,
    ) -> StoreResult<Arc<Store>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(main_options)
            .await?;
        let signature_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(signature_options)
            .await?;

        let store = Arc::new(Store {
            pool,
            signature_pool,
            db_file,
            events: ChangeBus::new(),
            actions_to_keep: AtomicU32::new(50),
            loaded_images: SingleLoad::new(),
            loaded_collections: SingleLoad::new(),
            loaded_folders: SingleLoad::new(),
            loaded_tags: SingleLoad::new(),
            loaded_galleries: SingleLoad::new(),
        });

        store.init_main().await?;
        store.init_signatures().await?;

        Ok(store)
    }

    async fn init_main(self: &Arc<Store>) -> StoreResult<()> {
        let mut conn = self.conn().await?;

        sqlx::raw_sql("PRAGMA recursive_triggers = ON;")
            .execute(&mut *conn)
            .await?;

        // Foreign keys must have been applied by the connect options.
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys;")
            .fetch_one(&mut *conn)
            .await?;
        if fk != 1 {
            return Err(StoreError::InvalidState(
                "foreign keys didn't get enabled".into(),
            ));
        }

        match select_version(&mut conn).await {
            None => {
                info!("Creating a fresh database");
                self.create_table_structure(&mut conn).await?;
            }
            Some(version) if version == DATABASE_CURRENT_VERSION => {}
            Some(version) if version > DATABASE_CURRENT_VERSION => {
                return Err(StoreError::InvalidState(format!(
                    "database version {} is newer than supported {}",
                    version, DATABASE_CURRENT_VERSION
                )));
            }
            Some(mut version) => {
                self.backup_before_migration()?;
                info!(
                    "Database: updating from version {} to {}",
                    version, DATABASE_CURRENT_VERSION
                );
                while version != DATABASE_CURRENT_VERSION {
                    version = self.run_migration(&mut conn, version).await?;
                }
            }
        }

        Ok(())
    }

    async fn init_signatures(self: &Arc<Store>) -> StoreResult<()> {
        let mut conn = self.signature_pool.acquire().await?;

        match select_version(&mut conn).await {
            None => {
                sqlx::raw_sql(schema::SIGNATURE_TABLES_SQL)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("INSERT INTO version (number) VALUES (?)")
                    .bind(DATABASE_CURRENT_SIGNATURES_VERSION)
                    .execute(&mut *conn)
                    .await?;
            }
            Some(version) if version == DATABASE_CURRENT_SIGNATURES_VERSION => {}
            Some(version) => {
                return Err(StoreError::InvalidState(format!(
                    "unsupported signature database version {}",
                    version
                )));
            }
        }

        Ok(())
    }

    async fn create_table_structure(
        self: &Arc<Store>,
        conn: &mut SqliteConnection,
    ) -> StoreResult<()> {
        begin(conn).await?;

        sqlx::raw_sql(schema::MAIN_TABLES_SQL).execute(&mut *conn).await?;

        // Default collections. Uncategorized goes first to claim id 1.
        collection_repo::insert_collection(self, conn, "Uncategorized", false).await?;
        collection_repo::insert_collection(self, conn, "PrivateRandom", true).await?;
        collection_repo::insert_collection(self, conn, "Backgrounds", false).await?;

        folder_repo::insert_root_folder(conn).await?;

        sqlx::query("INSERT INTO version (number) VALUES (?)")
            .bind(DATABASE_CURRENT_VERSION)
            .execute(&mut *conn)
            .await?;

        commit(conn).await?;
        Ok(())
    }

    fn backup_before_migration(&self) -> StoreResult<()> {
        let Some(db_file) = &self.db_file else {
            return Ok(());
        };

        let mut suffix = 1;
        let target = loop {
            let candidate = PathBuf::from(format!("{}.{}.bak", db_file.display(), suffix));
            if !candidate.exists() {
                break candidate;
            }
            suffix += 1;
        };

        std::fs::copy(db_file, &target)?;
        info!("Database backed up to {:?} before migration", target);
        Ok(())
    }

    /// Applies the migration starting at `from` and returns the new
    /// version number.
    async fn run_migration(
        self: &Arc<Store>,
        conn: &mut SqliteConnection,
        from: i64,
    ) -> StoreResult<i64> {
        match from {
            1 => {
                // Applied tags gained a uniqueness guarantee in version 2;
                // fold existing duplicates before relying on it.
                tag_repo::coalesce_applied_tags(conn).await?;
                set_version(conn, 2).await?;
                Ok(2)
            }
            other => {
                error!("No migration path from database version {}", other);
                Err(StoreError::InvalidState(format!(
                    "database version {} is unsupported",
                    other
                )))
            }
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn signature_pool(&self) -> &SqlitePool {
        &self.signature_pool
    }

    pub async fn conn(&self) -> StoreResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub fn set_max_action_history(&self, max_actions: u32) {
        self.actions_to_keep
            .store(max_actions.max(1), Ordering::Release);
    }

    pub fn max_action_history(&self) -> u32 {
        self.actions_to_keep.load(Ordering::Acquire)
    }

    /// Drops identity-map entries that no longer have external references.
    pub fn purge_inactive_cache(&self) {
        self.loaded_images.purge();
        self.loaded_collections.purge();
        self.loaded_folders.purge();
        self.loaded_tags.purge();
        self.loaded_galleries.purge();
    }
}

pub async fn select_version(conn: &mut SqliteConnection) -> Option<i64> {
    sqlx::query_scalar::<_, i64>("SELECT number FROM version")
        .fetch_optional(&mut *conn)
        .await
        .ok()
        .flatten()
}

async fn set_version(conn: &mut SqliteConnection, version: i64) -> StoreResult<()> {
    sqlx::query("UPDATE version SET number = ?")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ─── Transaction helpers ──────────────────────────────────────────
//
// Callers signal failure with an explicit `rollback`; a transaction left
// open on error paths is rolled back by the next BEGIN failing loudly
// rather than silently committing partial work.

pub async fn begin(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query("BEGIN TRANSACTION").execute(&mut *conn).await?;
    Ok(())
}

pub async fn commit(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query("COMMIT TRANSACTION").execute(&mut *conn).await?;
    Ok(())
}

pub async fn rollback(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query("ROLLBACK TRANSACTION")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn check_savepoint_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid savepoint name: {name}"
        )))
    }
}

pub async fn begin_savepoint(conn: &mut SqliteConnection, name: &str) -> StoreResult<()> {
    check_savepoint_name(name)?;
    sqlx::query(&format!("SAVEPOINT {name}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn release_savepoint(conn: &mut SqliteConnection, name: &str) -> StoreResult<()> {
    check_savepoint_name(name)?;
    sqlx::query(&format!("RELEASE SAVEPOINT {name}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn rollback_savepoint(conn: &mut SqliteConnection, name: &str) -> StoreResult<()> {
    check_savepoint_name(name)?;
    sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
