use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use guardian_core::{AppError, AppResult, ClusterId};
use guardian_domain::{ClusterConfig, ScanStatus};

use crate::cache_ports::ClusterRepository;
use crate::catalog_reader::CatalogReader;
use crate::connection_ports::ClusterConnector;

/// Result of an operator connection test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    /// Whether the round trip succeeded.
    pub ok: bool,
    /// Human-readable outcome, including the masked connection description.
    pub message: String,
}

/// Application service for cluster configuration records.
#[derive(Clone)]
pub struct ClusterService {
    repository: Arc<dyn ClusterRepository>,
    connector: Arc<dyn ClusterConnector>,
}

impl ClusterService {
    /// Creates a cluster service.
    #[must_use]
    pub fn new(repository: Arc<dyn ClusterRepository>, connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            repository,
            connector,
        }
    }

    /// Lists clusters ordered by name.
    pub async fn list_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        self.repository.list_clusters().await
    }

    /// Returns one cluster or `NotFound`.
    pub async fn find_cluster(&self, cluster_id: ClusterId) -> AppResult<ClusterConfig> {
        self.repository
            .find_cluster(cluster_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster {cluster_id} does not exist")))
    }

    /// Returns one cluster by case-insensitive name or `NotFound`.
    pub async fn find_cluster_by_name(&self, name: &str) -> AppResult<ClusterConfig> {
        self.repository
            .find_cluster_by_name(name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{}' does not exist", name.trim())))
    }

    /// Lists clusters that have never been scanned.
    pub async fn list_unscanned_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        self.repository.list_unscanned_clusters().await
    }

    /// Counts configured clusters.
    pub async fn cluster_count(&self) -> AppResult<u64> {
        self.repository.count_clusters().await
    }

    /// Inserts a new cluster or updates an existing one.
    ///
    /// Cluster names are unique ignoring case, checked on insert and on rename.
    pub async fn save_cluster(&self, cluster: ClusterConfig) -> AppResult<ClusterConfig> {
        if let Some(existing) = self.repository.find_cluster_by_name(cluster.name()).await?
            && existing.id() != cluster.id()
        {
            return Err(AppError::Conflict(format!(
                "a cluster with name '{}' already exists",
                cluster.name()
            )));
        }

        let saved = match cluster.id() {
            None => self.repository.insert_cluster(&cluster).await?,
            Some(cluster_id) => {
                if self.repository.find_cluster(cluster_id).await?.is_none() {
                    return Err(AppError::NotFound(format!(
                        "cluster {cluster_id} does not exist"
                    )));
                }
                self.repository.update_cluster(&cluster).await?
            }
        };

        info!(
            cluster_id = ?saved.id().map(|id| id.as_i64()),
            cluster = %saved.name(),
            "cluster saved"
        );
        Ok(saved)
    }

    /// Deletes a cluster and its cached snapshot.
    pub async fn delete_cluster(&self, cluster_id: ClusterId) -> AppResult<()> {
        self.find_cluster(cluster_id).await?;
        self.repository.delete_cluster(cluster_id).await?;
        info!(cluster_id = %cluster_id, "cluster deleted");
        Ok(())
    }

    /// Tests connectivity. Never fails; the outcome is in the returned check.
    pub async fn test_connection(&self, cluster: &ClusterConfig) -> ConnectionCheck {
        let description = self.connector.describe(cluster);
        let ok = CatalogReader::test_connection(self.connector.as_ref(), cluster).await;

        ConnectionCheck {
            ok,
            message: if ok {
                format!("Connection successful: {description}")
            } else {
                format!("Connection failed: {description}")
            },
        }
    }

    /// Records the outcome of a scan on the cluster record.
    pub async fn record_scan_status(
        &self,
        cluster_id: ClusterId,
        scanned_at: DateTime<Utc>,
        status: ScanStatus,
    ) -> AppResult<()> {
        self.repository
            .record_scan_status(cluster_id, scanned_at, status)
            .await
    }
}
