use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use guardian_core::{AppError, AppResult};

use crate::{SqliteClusterRepository, SqlitePermissionCacheRepository, SqliteQueryTemplateRepository};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Local SQLite file holding cluster records, cached snapshots and saved queries.
///
/// The schema is created on first open. A single pooled connection serializes writes.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Opens or creates the store file and applies pending migrations.
    pub async fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                AppError::Internal(format!(
                    "failed to create cache directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to open cache store '{}': {error}",
                    path.display()
                ))
            })?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "cache store ready");
        Ok(store)
    }

    /// Opens a private in-memory store, used by tests and dry runs.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|error| AppError::Internal(format!("invalid in-memory store url: {error}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to open in-memory cache store: {error}"))
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to migrate cache store: {error}")))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Returns a cluster record repository over this store.
    #[must_use]
    pub fn cluster_repository(&self) -> SqliteClusterRepository {
        SqliteClusterRepository::new(self.pool.clone())
    }

    /// Returns a snapshot repository over this store.
    #[must_use]
    pub fn permission_cache_repository(&self) -> SqlitePermissionCacheRepository {
        SqlitePermissionCacheRepository::new(self.pool.clone())
    }

    /// Returns a query library repository over this store.
    #[must_use]
    pub fn query_template_repository(&self) -> SqliteQueryTemplateRepository {
        SqliteQueryTemplateRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteCacheStore;

    #[tokio::test]
    async fn in_memory_store_creates_schema() {
        let Ok(store) = SqliteCacheStore::in_memory().await else {
            panic!("in-memory store should open");
        };

        let tables: Result<Vec<(String,)>, _> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(&store.pool())
        .await;

        let Ok(tables) = tables else {
            panic!("sqlite_master should be readable");
        };
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        for expected in ["cached_permissions", "cached_users", "clusters", "query_templates"] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "guardian-cache-{}-{}.db",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        assert!(SqliteCacheStore::open(path.as_path()).await.is_ok());
        assert!(SqliteCacheStore::open(path.as_path()).await.is_ok());

        let _ = std::fs::remove_file(&path);
    }
}
