use async_trait::async_trait;
use chrono::{DateTime, Utc};

use guardian_core::{AppResult, ClusterId};
use guardian_domain::{ClusterConfig, QueryTemplate, RemoteUser, ScanStatus, TablePermission};

// ---------------------------------------------------------------------------
// Cluster records
// ---------------------------------------------------------------------------

/// Repository port for cluster configuration records.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Lists clusters ordered by name.
    async fn list_clusters(&self) -> AppResult<Vec<ClusterConfig>>;

    /// Finds a cluster by identifier.
    async fn find_cluster(&self, cluster_id: ClusterId) -> AppResult<Option<ClusterConfig>>;

    /// Finds a cluster by name, ignoring ASCII case.
    async fn find_cluster_by_name(&self, name: &str) -> AppResult<Option<ClusterConfig>>;

    /// Lists clusters that were never scanned.
    async fn list_unscanned_clusters(&self) -> AppResult<Vec<ClusterConfig>>;

    /// Counts configured clusters.
    async fn count_clusters(&self) -> AppResult<u64>;

    /// Inserts a new cluster and returns it with its assigned id.
    async fn insert_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig>;

    /// Updates an existing cluster and returns the stored record.
    async fn update_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig>;

    /// Deletes a cluster together with its cached snapshot.
    async fn delete_cluster(&self, cluster_id: ClusterId) -> AppResult<()>;

    /// Records the outcome of the latest scan.
    async fn record_scan_status(
        &self,
        cluster_id: ClusterId,
        scanned_at: DateTime<Utc>,
        status: ScanStatus,
    ) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Cached snapshots
// ---------------------------------------------------------------------------

/// Repository port for the per-cluster users and permissions snapshot.
#[async_trait]
pub trait PermissionCacheRepository: Send + Sync {
    /// Replaces the cluster's cached snapshot with the given rows.
    ///
    /// Either every prior row is replaced or nothing changes.
    async fn replace_snapshot(
        &self,
        cluster_id: ClusterId,
        users: &[RemoteUser],
        permissions: &[TablePermission],
    ) -> AppResult<()>;

    /// Returns cached users ordered by username.
    async fn cached_users(&self, cluster_id: ClusterId) -> AppResult<Vec<RemoteUser>>;

    /// Returns cached permissions ordered by username, schema and table.
    async fn cached_permissions(&self, cluster_id: ClusterId) -> AppResult<Vec<TablePermission>>;

    /// Counts cached users.
    async fn cached_user_count(&self, cluster_id: ClusterId) -> AppResult<u64>;

    /// Counts cached permissions.
    async fn cached_permission_count(&self, cluster_id: ClusterId) -> AppResult<u64>;
}

// ---------------------------------------------------------------------------
// Query library
// ---------------------------------------------------------------------------

/// Repository port for saved query templates.
#[async_trait]
pub trait QueryTemplateRepository: Send + Sync {
    /// Lists templates ordered by category and name.
    async fn list_templates(&self) -> AppResult<Vec<QueryTemplate>>;

    /// Finds a template by identifier.
    async fn find_template(&self, template_id: i64) -> AppResult<Option<QueryTemplate>>;

    /// Inserts a template and returns it with its assigned id.
    async fn insert_template(&self, template: &QueryTemplate) -> AppResult<QueryTemplate>;

    /// Updates an existing template.
    async fn update_template(&self, template: &QueryTemplate) -> AppResult<QueryTemplate>;

    /// Deletes a template.
    async fn delete_template(&self, template_id: i64) -> AppResult<()>;

    /// Counts built-in templates.
    async fn count_built_in_templates(&self) -> AppResult<u64>;
}
