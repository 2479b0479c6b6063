use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use guardian_application::PermissionCacheRepository;
use guardian_core::{AppError, AppResult, ClusterId};
use guardian_domain::{PermissionKind, RemoteUser, TablePermission};

#[cfg(test)]
mod tests;

/// SQLite-backed repository for per-cluster users and permissions snapshots.
#[derive(Clone)]
pub struct SqlitePermissionCacheRepository {
    pool: SqlitePool,
}

impl SqlitePermissionCacheRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn count_rows(&self, table: &str, cluster_id: ClusterId) -> AppResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE cluster_id = ?");
        let count = sqlx::query_scalar::<_, i64>(sql.as_str())
            .bind(cluster_id.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to count {table} for cluster {cluster_id}: {error}"
                ))
            })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(Debug, FromRow)]
struct CachedUserRow {
    username: String,
    user_id: i64,
    is_superuser: bool,
    can_create_db: bool,
    can_create_user: bool,
    valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct CachedPermissionRow {
    username: String,
    schema_name: String,
    table_name: String,
    permission_type: String,
}

fn cache_write_error(cluster_id: ClusterId, error: sqlx::Error) -> AppError {
    AppError::Internal(format!(
        "failed to replace cached snapshot for cluster {cluster_id}: {error}"
    ))
}

#[async_trait]
impl PermissionCacheRepository for SqlitePermissionCacheRepository {
    async fn replace_snapshot(
        &self,
        cluster_id: ClusterId,
        users: &[RemoteUser],
        permissions: &[TablePermission],
    ) -> AppResult<()> {
        let cached_at = Utc::now();
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| cache_write_error(cluster_id, error))?;

        for table in ["cached_users", "cached_permissions"] {
            let sql = format!("DELETE FROM {table} WHERE cluster_id = ?");
            sqlx::query(sql.as_str())
                .bind(cluster_id.as_i64())
                .execute(&mut *transaction)
                .await
                .map_err(|error| cache_write_error(cluster_id, error))?;
        }

        for user in users {
            sqlx::query(
                r#"
                INSERT INTO cached_users (
                    cluster_id,
                    username,
                    user_id,
                    is_superuser,
                    can_create_db,
                    can_create_user,
                    valid_until,
                    cached_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(cluster_id.as_i64())
            .bind(user.username.as_str())
            .bind(user.user_id)
            .bind(user.is_superuser)
            .bind(user.can_create_db)
            .bind(user.can_create_user)
            .bind(user.valid_until)
            .bind(cached_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| cache_write_error(cluster_id, error))?;
        }

        for permission in permissions {
            sqlx::query(
                r#"
                INSERT INTO cached_permissions (
                    cluster_id,
                    username,
                    schema_name,
                    table_name,
                    permission_type,
                    cached_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(cluster_id.as_i64())
            .bind(permission.username.as_str())
            .bind(permission.schema_name.as_str())
            .bind(permission.table_name.as_str())
            .bind(permission.permission.as_str())
            .bind(cached_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| cache_write_error(cluster_id, error))?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| cache_write_error(cluster_id, error))?;

        debug!(
            cluster_id = %cluster_id,
            user_count = users.len(),
            permission_count = permissions.len(),
            "replaced cached snapshot"
        );
        Ok(())
    }

    async fn cached_users(&self, cluster_id: ClusterId) -> AppResult<Vec<RemoteUser>> {
        let rows = sqlx::query_as::<_, CachedUserRow>(
            r#"
            SELECT username, user_id, is_superuser, can_create_db, can_create_user, valid_until
            FROM cached_users
            WHERE cluster_id = ?
            ORDER BY username
            "#,
        )
        .bind(cluster_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to read cached users for cluster {cluster_id}: {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| RemoteUser {
                username: row.username,
                user_id: row.user_id,
                is_superuser: row.is_superuser,
                can_create_db: row.can_create_db,
                can_create_user: row.can_create_user,
                valid_until: row.valid_until,
            })
            .collect())
    }

    async fn cached_permissions(&self, cluster_id: ClusterId) -> AppResult<Vec<TablePermission>> {
        let rows = sqlx::query_as::<_, CachedPermissionRow>(
            r#"
            SELECT username, schema_name, table_name, permission_type
            FROM cached_permissions
            WHERE cluster_id = ?
            ORDER BY username, schema_name, table_name, id
            "#,
        )
        .bind(cluster_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to read cached permissions for cluster {cluster_id}: {error}"
            ))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(TablePermission {
                    permission: row.permission_type.parse::<PermissionKind>()?,
                    username: row.username,
                    schema_name: row.schema_name,
                    table_name: row.table_name,
                })
            })
            .collect()
    }

    async fn cached_user_count(&self, cluster_id: ClusterId) -> AppResult<u64> {
        self.count_rows("cached_users", cluster_id).await
    }

    async fn cached_permission_count(&self, cluster_id: ClusterId) -> AppResult<u64> {
        self.count_rows("cached_permissions", cluster_id).await
    }
}
