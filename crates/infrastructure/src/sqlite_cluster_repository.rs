use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use guardian_application::ClusterRepository;
use guardian_core::{AppError, AppResult, ClusterId};
use guardian_domain::{ClusterConfig, ClusterConfigInput, CredentialMode, ScanStatus};


const CLUSTER_COLUMNS: &str = r#"
    id,
    name,
    host,
    port,
    database_name,
    cluster_type,
    region,
    credential_profile,
    use_iam,
    username,
    last_scan_at,
    last_scan_status,
    created_at,
    updated_at
"#;

/// SQLite-backed repository for cluster configuration records.
#[derive(Clone)]
pub struct SqliteClusterRepository {
    pool: SqlitePool,
}

impl SqliteClusterRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_clusters(&self, filter: &str) -> AppResult<Vec<ClusterConfig>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters {filter} ORDER BY name");
        let rows = sqlx::query_as::<_, ClusterRow>(sql.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list clusters: {error}")))?;

        rows.into_iter().map(ClusterRow::into_cluster).collect()
    }
}

#[derive(Debug, FromRow)]
struct ClusterRow {
    id: i64,
    name: String,
    host: String,
    port: i64,
    database_name: String,
    cluster_type: String,
    region: String,
    credential_profile: Option<String>,
    use_iam: bool,
    username: Option<String>,
    last_scan_at: Option<DateTime<Utc>>,
    last_scan_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClusterRow {
    fn into_cluster(self) -> AppResult<ClusterConfig> {
        let port = u16::try_from(self.port).map_err(|_| {
            AppError::Internal(format!(
                "stored port {} for cluster '{}' is out of range",
                self.port, self.name
            ))
        })?;

        let credential = if self.use_iam {
            CredentialMode::Profile {
                profile: self.credential_profile.unwrap_or_default(),
            }
        } else {
            CredentialMode::Password {
                username: self.username.unwrap_or_default(),
            }
        };

        let last_scan_status = self
            .last_scan_status
            .as_deref()
            .map(str::parse::<ScanStatus>)
            .transpose()?;

        Ok(ClusterConfig::new(ClusterConfigInput {
            name: self.name,
            host: self.host,
            port,
            database: self.database_name,
            cluster_type: self.cluster_type.parse()?,
            region: self.region,
            credential,
        })?
        .with_id(ClusterId::new(self.id))
        .with_timestamps(self.created_at, self.updated_at)
        .with_last_scan(self.last_scan_at, last_scan_status))
    }
}

fn map_write_error(cluster: &ClusterConfig, action: &str, error: sqlx::Error) -> AppError {
    let unique_violation = error
        .as_database_error()
        .is_some_and(|database_error| database_error.is_unique_violation());

    if unique_violation {
        return AppError::Conflict(format!(
            "a cluster with name '{}' already exists",
            cluster.name()
        ));
    }

    AppError::Internal(format!(
        "failed to {action} cluster '{}': {error}",
        cluster.name()
    ))
}

#[async_trait]
impl ClusterRepository for SqliteClusterRepository {
    async fn list_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        self.fetch_clusters("").await
    }

    async fn find_cluster(&self, cluster_id: ClusterId) -> AppResult<Option<ClusterConfig>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE id = ?");
        let row = sqlx::query_as::<_, ClusterRow>(sql.as_str())
            .bind(cluster_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find cluster {cluster_id}: {error}"))
            })?;

        row.map(ClusterRow::into_cluster).transpose()
    }

    async fn find_cluster_by_name(&self, name: &str) -> AppResult<Option<ClusterConfig>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE name = ? COLLATE NOCASE");
        let row = sqlx::query_as::<_, ClusterRow>(sql.as_str())
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find cluster '{name}': {error}"))
            })?;

        row.map(ClusterRow::into_cluster).transpose()
    }

    async fn list_unscanned_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        self.fetch_clusters("WHERE last_scan_at IS NULL").await
    }

    async fn count_clusters(&self) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clusters")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to count clusters: {error}")))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn insert_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig> {
        let now = Utc::now();
        let credential = cluster.credential();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO clusters (
                name,
                host,
                port,
                database_name,
                cluster_type,
                region,
                credential_profile,
                use_iam,
                username,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(cluster.name())
        .bind(cluster.host())
        .bind(i64::from(cluster.port()))
        .bind(cluster.database())
        .bind(cluster.cluster_type().as_str())
        .bind(cluster.region())
        .bind(credential.profile())
        .bind(credential.is_profile())
        .bind(credential.username())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_write_error(cluster, "insert", error))?;

        Ok(cluster
            .clone()
            .with_id(ClusterId::new(id))
            .with_timestamps(now, now))
    }

    async fn update_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig> {
        let Some(cluster_id) = cluster.id() else {
            return Err(AppError::Validation(
                "cannot update a cluster that was never saved".to_owned(),
            ));
        };

        let credential = cluster.credential();
        let result = sqlx::query(
            r#"
            UPDATE clusters
            SET name = ?,
                host = ?,
                port = ?,
                database_name = ?,
                cluster_type = ?,
                region = ?,
                credential_profile = ?,
                use_iam = ?,
                username = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(cluster.name())
        .bind(cluster.host())
        .bind(i64::from(cluster.port()))
        .bind(cluster.database())
        .bind(cluster.cluster_type().as_str())
        .bind(cluster.region())
        .bind(credential.profile())
        .bind(credential.is_profile())
        .bind(credential.username())
        .bind(Utc::now())
        .bind(cluster_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| map_write_error(cluster, "update", error))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "cluster {cluster_id} does not exist"
            )));
        }

        self.find_cluster(cluster_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster {cluster_id} does not exist")))
    }

    async fn delete_cluster(&self, cluster_id: ClusterId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(cluster_id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete cluster {cluster_id}: {error}"))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "cluster {cluster_id} does not exist"
            )));
        }

        Ok(())
    }

    async fn record_scan_status(
        &self,
        cluster_id: ClusterId,
        scanned_at: DateTime<Utc>,
        status: ScanStatus,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE clusters SET last_scan_at = ?, last_scan_status = ? WHERE id = ?",
        )
        .bind(scanned_at)
        .bind(status.as_str())
        .bind(cluster_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record scan status for cluster {cluster_id}: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "cluster {cluster_id} does not exist"
            )));
        }

        Ok(())
    }
}
