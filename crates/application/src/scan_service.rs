use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use guardian_core::{AppError, AppResult, ClusterId};
use guardian_domain::{ClusterConfig, RemoteUser, RoleLineage, ScanStatus, TablePermission};

use crate::cache_ports::{ClusterRepository, PermissionCacheRepository};
use crate::catalog_reader::CatalogReader;
use crate::connection_ports::{ClusterConnection, ClusterConnector};
use crate::tabular::{SqlValue, TabularColumn, TabularResult};

#[cfg(test)]
mod tests;

/// Stage of one scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    /// Not started.
    Idle,
    /// Opening the remote connection.
    Connecting,
    /// Reading the user catalog.
    ReadingUsers,
    /// Running the per-kind privilege queries.
    ReadingPermissions,
    /// Reading role memberships.
    ReadingLineage,
    /// Replacing the local snapshot.
    Caching,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed,
}

impl ScanPhase {
    /// Returns a stable label for logs and output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::ReadingUsers => "reading_users",
            Self::ReadingPermissions => "reading_permissions",
            Self::ReadingLineage => "reading_lineage",
            Self::Caching => "caching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl Display for ScanPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome of scanning one cluster.
#[derive(Debug)]
pub struct ScanResult {
    /// Scanned cluster, `None` when the record was never saved.
    pub cluster_id: Option<ClusterId>,
    /// Scanned cluster name.
    pub cluster_name: String,
    /// Scan start.
    pub started_at: DateTime<Utc>,
    /// Scan end.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Whether the snapshot was replaced.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Failure cause.
    pub error: Option<AppError>,
    /// Phase in which the scan failed.
    pub failed_phase: Option<ScanPhase>,
    /// Users read from the catalog.
    pub users: Vec<RemoteUser>,
    /// Table privileges read from the catalog.
    pub permissions: Vec<TablePermission>,
    /// Role memberships read from the catalog. Not cached.
    pub lineage: Vec<RoleLineage>,
    /// Number of users read.
    pub user_count: usize,
    /// Number of privileges read.
    pub permission_count: usize,
}

/// Aggregate of a multi-cluster scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// One result per configured cluster, in name order.
    pub results: Vec<ScanResult>,
    /// Successful scans.
    pub succeeded: usize,
    /// Failed scans.
    pub failed: usize,
}

impl ScanSummary {
    /// Returns whether every scan succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

struct Snapshot {
    users: Vec<RemoteUser>,
    permissions: Vec<TablePermission>,
    lineage: Vec<RoleLineage>,
}

/// Drives catalog scans and owns the cached snapshot read paths.
#[derive(Clone)]
pub struct ScanService {
    connector: Arc<dyn ClusterConnector>,
    cluster_repository: Arc<dyn ClusterRepository>,
    cache_repository: Arc<dyn PermissionCacheRepository>,
    in_flight: Arc<Mutex<HashSet<ClusterId>>>,
}

impl ScanService {
    /// Creates a scan service.
    #[must_use]
    pub fn new(
        connector: Arc<dyn ClusterConnector>,
        cluster_repository: Arc<dyn ClusterRepository>,
        cache_repository: Arc<dyn PermissionCacheRepository>,
    ) -> Self {
        Self {
            connector,
            cluster_repository,
            cache_repository,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Scans one cluster and replaces its cached snapshot on success.
    ///
    /// The cluster's last-scan status is recorded whatever the outcome, except
    /// when the scan is refused because another scan of the same cluster runs.
    pub async fn scan(&self, cluster: &ClusterConfig) -> ScanResult {
        let started_at = Utc::now();

        let Some(cluster_id) = cluster.id() else {
            return failed_result(
                cluster,
                started_at,
                ScanPhase::Idle,
                AppError::Validation("cluster must be saved before it can be scanned".to_owned()),
                Snapshot::empty(),
            );
        };

        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, cluster_id) else {
            warn!(cluster_id = %cluster_id, "scan refused, another scan is running");
            return failed_result(
                cluster,
                started_at,
                ScanPhase::Idle,
                AppError::Conflict("scan already in progress".to_owned()),
                Snapshot::empty(),
            );
        };

        info!(cluster_id = %cluster_id, cluster = %cluster.name(), "scan started");
        let outcome = self.run_scan(cluster_id, cluster).await;
        let finished_at = Utc::now();

        let mut result = match outcome {
            Ok(snapshot) => {
                let mut result = base_result(cluster, started_at, finished_at, snapshot);
                result.success = true;
                result.message = format!(
                    "Scan completed successfully: {} users, {} permissions",
                    result.user_count, result.permission_count
                );
                info!(
                    cluster_id = %cluster_id,
                    user_count = result.user_count,
                    permission_count = result.permission_count,
                    duration_ms = result.duration.as_millis(),
                    "scan completed"
                );
                result
            }
            Err((phase, error, snapshot)) => {
                warn!(cluster_id = %cluster_id, phase = %phase, error = %error, "scan failed");
                failed_result(cluster, started_at, phase, error, snapshot)
            }
        };

        let status = if result.success {
            ScanStatus::Success
        } else {
            ScanStatus::Failed
        };
        if let Err(error) = self
            .cluster_repository
            .record_scan_status(cluster_id, finished_at, status)
            .await
        {
            warn!(cluster_id = %cluster_id, error = %error, "failed to record scan status");
            result
                .message
                .push_str(format!(" (scan status not recorded: {error})").as_str());
        }

        result
    }

    /// Scans every configured cluster sequentially.
    pub async fn scan_all(&self) -> AppResult<ScanSummary> {
        let clusters = self.cluster_repository.list_clusters().await?;
        let mut summary = ScanSummary::default();

        for cluster in &clusters {
            let result = self.scan(cluster).await;
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(result);
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scan of all clusters finished"
        );
        Ok(summary)
    }

    /// Returns the cached users of the latest successful scan.
    pub async fn cached_users(&self, cluster_id: ClusterId) -> AppResult<Vec<RemoteUser>> {
        self.cache_repository.cached_users(cluster_id).await
    }

    /// Returns the cached permissions of the latest successful scan.
    pub async fn cached_permissions(
        &self,
        cluster_id: ClusterId,
    ) -> AppResult<Vec<TablePermission>> {
        self.cache_repository.cached_permissions(cluster_id).await
    }

    /// Returns cached user and permission counts.
    pub async fn cached_counts(&self, cluster_id: ClusterId) -> AppResult<(u64, u64)> {
        let users = self.cache_repository.cached_user_count(cluster_id).await?;
        let permissions = self
            .cache_repository
            .cached_permission_count(cluster_id)
            .await?;
        Ok((users, permissions))
    }

    /// Returns cached permissions matching `filter` as an exportable table.
    ///
    /// The filter is a case-insensitive substring over user, schema, table and kind.
    pub async fn export_cached_permissions(
        &self,
        cluster_id: ClusterId,
        filter: Option<&str>,
    ) -> AppResult<TabularResult> {
        let permissions = self.cache_repository.cached_permissions(cluster_id).await?;

        let mut result = TabularResult::new(vec![
            TabularColumn::new("Username", "TEXT"),
            TabularColumn::new("Schema", "TEXT"),
            TabularColumn::new("Table", "TEXT"),
            TabularColumn::new("Permission", "TEXT"),
        ]);
        for permission in permissions
            .iter()
            .filter(|permission| filter.is_none_or(|filter| permission.matches_filter(filter)))
        {
            result.push_row(vec![
                SqlValue::from(permission.username.as_str()),
                SqlValue::from(permission.schema_name.as_str()),
                SqlValue::from(permission.table_name.as_str()),
                SqlValue::from(permission.permission.as_str()),
            ])?;
        }

        Ok(result)
    }

    async fn run_scan(
        &self,
        cluster_id: ClusterId,
        cluster: &ClusterConfig,
    ) -> Result<Snapshot, (ScanPhase, AppError, Snapshot)> {
        let mut connection = self
            .connector
            .connect(cluster)
            .await
            .map_err(|error| (ScanPhase::Connecting, error, Snapshot::empty()))?;

        let read = read_catalog(connection.as_mut()).await;
        if let Err(error) = connection.close().await {
            warn!(cluster_id = %cluster_id, error = %error, "failed to close scan connection");
        }
        let snapshot = read?;

        if let Err(error) = self
            .cache_repository
            .replace_snapshot(cluster_id, &snapshot.users, &snapshot.permissions)
            .await
        {
            return Err((ScanPhase::Caching, error, snapshot));
        }

        Ok(snapshot)
    }
}

async fn read_catalog(
    connection: &mut dyn ClusterConnection,
) -> Result<Snapshot, (ScanPhase, AppError, Snapshot)> {
    let mut reader = CatalogReader::new(connection);
    let mut snapshot = Snapshot::empty();

    match reader.list_users().await {
        Ok(users) => snapshot.users = users,
        Err(error) => return Err((ScanPhase::ReadingUsers, error, snapshot)),
    }
    match reader.list_table_permissions().await {
        Ok(permissions) => snapshot.permissions = permissions,
        Err(error) => return Err((ScanPhase::ReadingPermissions, error, snapshot)),
    }
    match reader.list_role_lineage().await {
        Ok(lineage) => snapshot.lineage = lineage,
        Err(error) => return Err((ScanPhase::ReadingLineage, error, snapshot)),
    }

    Ok(snapshot)
}

/// Marks a cluster as being scanned until dropped, including on cancellation.
struct InFlightClaim {
    in_flight: Arc<Mutex<HashSet<ClusterId>>>,
    cluster_id: ClusterId,
}

impl InFlightClaim {
    fn acquire(in_flight: &Arc<Mutex<HashSet<ClusterId>>>, cluster_id: ClusterId) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cluster_id);

        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            cluster_id,
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.cluster_id);
    }
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            users: Vec::new(),
            permissions: Vec::new(),
            lineage: Vec::new(),
        }
    }
}

fn base_result(
    cluster: &ClusterConfig,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    snapshot: Snapshot,
) -> ScanResult {
    ScanResult {
        cluster_id: cluster.id(),
        cluster_name: cluster.name().to_owned(),
        started_at,
        finished_at,
        duration: (finished_at - started_at).to_std().unwrap_or_default(),
        success: false,
        message: String::new(),
        error: None,
        failed_phase: None,
        user_count: snapshot.users.len(),
        permission_count: snapshot.permissions.len(),
        users: snapshot.users,
        permissions: snapshot.permissions,
        lineage: snapshot.lineage,
    }
}

fn failed_result(
    cluster: &ClusterConfig,
    started_at: DateTime<Utc>,
    phase: ScanPhase,
    error: AppError,
    snapshot: Snapshot,
) -> ScanResult {
    let mut result = base_result(cluster, started_at, Utc::now(), snapshot);
    result.message = format!("Scan failed: {error}");
    result.error = Some(error);
    result.failed_phase = Some(phase);
    result
}
