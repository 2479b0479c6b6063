use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use guardian_core::{AppError, AppResult, ClusterId};
use guardian_domain::{
    ClusterConfig, ClusterConfigInput, ClusterType, CredentialMode, PermissionKind, RemoteUser,
    ScanStatus, TablePermission,
};

use crate::cache_ports::{ClusterRepository, PermissionCacheRepository};
use crate::connection_ports::{ClusterConnection, ClusterConnector};
use crate::tabular::{SqlValue, TabularColumn, TabularResult};

use super::{ScanPhase, ScanService};

#[derive(Default)]
struct FakeClusterRepository {
    clusters: Mutex<Vec<ClusterConfig>>,
    statuses: Mutex<Vec<(ClusterId, DateTime<Utc>, ScanStatus)>>,
    fail_status_writes: bool,
}

#[async_trait]
impl ClusterRepository for FakeClusterRepository {
    async fn list_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        Ok(self.clusters.lock().await.clone())
    }

    async fn find_cluster(&self, cluster_id: ClusterId) -> AppResult<Option<ClusterConfig>> {
        Ok(self
            .clusters
            .lock()
            .await
            .iter()
            .find(|cluster| cluster.id() == Some(cluster_id))
            .cloned())
    }

    async fn find_cluster_by_name(&self, name: &str) -> AppResult<Option<ClusterConfig>> {
        Ok(self
            .clusters
            .lock()
            .await
            .iter()
            .find(|cluster| cluster.name().eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_unscanned_clusters(&self) -> AppResult<Vec<ClusterConfig>> {
        Ok(Vec::new())
    }

    async fn count_clusters(&self) -> AppResult<u64> {
        Ok(self.clusters.lock().await.len() as u64)
    }

    async fn insert_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig> {
        Ok(cluster.clone())
    }

    async fn update_cluster(&self, cluster: &ClusterConfig) -> AppResult<ClusterConfig> {
        Ok(cluster.clone())
    }

    async fn delete_cluster(&self, _cluster_id: ClusterId) -> AppResult<()> {
        Ok(())
    }

    async fn record_scan_status(
        &self,
        cluster_id: ClusterId,
        scanned_at: DateTime<Utc>,
        status: ScanStatus,
    ) -> AppResult<()> {
        if self.fail_status_writes {
            return Err(AppError::Internal("database is locked".to_owned()));
        }
        self.statuses
            .lock()
            .await
            .push((cluster_id, scanned_at, status));
        Ok(())
    }
}

#[derive(Default)]
struct FakeCacheRepository {
    snapshots: Mutex<HashMap<ClusterId, (Vec<RemoteUser>, Vec<TablePermission>)>>,
    fail_writes: bool,
}

#[async_trait]
impl PermissionCacheRepository for FakeCacheRepository {
    async fn replace_snapshot(
        &self,
        cluster_id: ClusterId,
        users: &[RemoteUser],
        permissions: &[TablePermission],
    ) -> AppResult<()> {
        if self.fail_writes {
            return Err(AppError::Internal("disk full".to_owned()));
        }
        self.snapshots
            .lock()
            .await
            .insert(cluster_id, (users.to_vec(), permissions.to_vec()));
        Ok(())
    }

    async fn cached_users(&self, cluster_id: ClusterId) -> AppResult<Vec<RemoteUser>> {
        Ok(self
            .snapshots
            .lock()
            .await
            .get(&cluster_id)
            .map(|(users, _)| users.clone())
            .unwrap_or_default())
    }

    async fn cached_permissions(&self, cluster_id: ClusterId) -> AppResult<Vec<TablePermission>> {
        Ok(self
            .snapshots
            .lock()
            .await
            .get(&cluster_id)
            .map(|(_, permissions)| permissions.clone())
            .unwrap_or_default())
    }

    async fn cached_user_count(&self, cluster_id: ClusterId) -> AppResult<u64> {
        Ok(self.cached_users(cluster_id).await?.len() as u64)
    }

    async fn cached_permission_count(&self, cluster_id: ClusterId) -> AppResult<u64> {
        Ok(self.cached_permissions(cluster_id).await?.len() as u64)
    }
}

/// Connector whose connections answer fetches from one shared script.
struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<AppResult<TabularResult>>>>,
    fetches: Arc<Mutex<usize>>,
    refuse: bool,
    gate: Option<Arc<Notify>>,
}

impl ScriptedConnector {
    fn new(script: Vec<AppResult<TabularResult>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fetches: Arc::new(Mutex::new(0)),
            refuse: false,
            gate: None,
        }
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<VecDeque<AppResult<TabularResult>>>>,
    fetches: Arc<Mutex<usize>>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ClusterConnector for ScriptedConnector {
    async fn connect(&self, _cluster: &ClusterConfig) -> AppResult<Box<dyn ClusterConnection>> {
        if self.refuse {
            return Err(AppError::Remote {
                message: "password authentication failed".to_owned(),
                sql_state: Some("28P01".to_owned()),
            });
        }
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
            fetches: self.fetches.clone(),
            gate: self.gate.clone(),
        }))
    }

    fn describe(&self, cluster: &ClusterConfig) -> String {
        cluster.host().to_owned()
    }
}

#[async_trait]
impl ClusterConnection for ScriptedConnection {
    async fn fetch(&mut self, _sql: &str, _parameters: &[SqlValue]) -> AppResult<TabularResult> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        *self.fetches.lock().await += 1;
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Internal("script exhausted".to_owned())))
    }

    async fn execute(&mut self, _sql: &str, _parameters: &[SqlValue]) -> AppResult<u64> {
        Ok(0)
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

fn saved_cluster(id: i64, name: &str) -> ClusterConfig {
    let cluster = ClusterConfig::new(ClusterConfigInput {
        name: name.to_owned(),
        host: format!("{name}.example.internal"),
        port: 5439,
        database: "dev".to_owned(),
        cluster_type: ClusterType::Provisioned,
        region: "us-east-1".to_owned(),
        credential: CredentialMode::default(),
    });
    let Ok(cluster) = cluster else {
        panic!("valid cluster");
    };
    cluster.with_id(ClusterId::new(id))
}

fn users_table(names: &[&str]) -> AppResult<TabularResult> {
    let mut result = TabularResult::new(
        [
            "username",
            "user_id",
            "is_superuser",
            "can_create_db",
            "can_create_user",
            "valid_until",
        ]
        .iter()
        .map(|name| TabularColumn::new(*name, "TEXT"))
        .collect(),
    );
    for (index, name) in names.iter().enumerate() {
        result.push_row(vec![
            SqlValue::from(*name),
            SqlValue::Int(100 + index as i64),
            SqlValue::Bool(index == 0),
            SqlValue::Bool(false),
            SqlValue::Bool(false),
            SqlValue::Null,
        ])?;
    }
    Ok(result)
}

fn grants_table(rows: &[(&str, &str)]) -> AppResult<TabularResult> {
    let mut result = TabularResult::new(
        ["username", "schema_name", "table_name"]
            .iter()
            .map(|name| TabularColumn::new(*name, "TEXT"))
            .collect(),
    );
    for (user, table) in rows {
        result.push_row(vec![
            SqlValue::from(*user),
            SqlValue::from("public"),
            SqlValue::from(*table),
        ])?;
    }
    Ok(result)
}

fn lineage_table() -> AppResult<TabularResult> {
    Ok(TabularResult::new(
        ["granted_role", "grantor", "admin_option"]
            .iter()
            .map(|name| TabularColumn::new(*name, "TEXT"))
            .collect(),
    ))
}

/// Three users and ten privileges spread across the four kind queries.
fn full_scan_script() -> Vec<AppResult<TabularResult>> {
    vec![
        users_table(&["admin", "alice", "bob"]),
        grants_table(&[
            ("admin", "orders"),
            ("admin", "customers"),
            ("alice", "orders"),
            ("alice", "customers"),
            ("bob", "orders"),
        ]),
        grants_table(&[("admin", "orders"), ("admin", "customers")]),
        grants_table(&[("admin", "orders"), ("alice", "orders")]),
        grants_table(&[("admin", "orders")]),
        lineage_table(),
    ]
}

fn is_scanning(service: &ScanService, cluster_id: ClusterId) -> bool {
    service
        .in_flight
        .lock()
        .map(|scanning| scanning.contains(&cluster_id))
        .unwrap_or(false)
}

fn previous_snapshot() -> (RemoteUser, TablePermission) {
    (
        RemoteUser {
            username: "alice".to_owned(),
            user_id: 42,
            is_superuser: false,
            can_create_db: false,
            can_create_user: false,
            valid_until: None,
        },
        TablePermission {
            username: "alice".to_owned(),
            schema_name: "public".to_owned(),
            table_name: "ledger".to_owned(),
            permission: PermissionKind::Select,
        },
    )
}

fn service(
    connector: ScriptedConnector,
    clusters: Arc<FakeClusterRepository>,
    cache: Arc<FakeCacheRepository>,
) -> ScanService {
    ScanService::new(Arc::new(connector), clusters, cache)
}

#[tokio::test]
async fn successful_scan_replaces_cache_and_records_success() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let cache = Arc::new(FakeCacheRepository::default());
    let cluster = saved_cluster(1, "analytics");

    let stale_user = RemoteUser {
        username: "departed".to_owned(),
        user_id: 7,
        is_superuser: false,
        can_create_db: false,
        can_create_user: false,
        valid_until: None,
    };
    let seeded = cache
        .replace_snapshot(ClusterId::new(1), &[stale_user], &[])
        .await;
    assert!(seeded.is_ok());

    let service = service(
        ScriptedConnector::new(full_scan_script()),
        clusters.clone(),
        cache.clone(),
    );
    let result = service.scan(&cluster).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.user_count, 3);
    assert_eq!(result.permission_count, 10);
    assert_eq!(
        result.message,
        "Scan completed successfully: 3 users, 10 permissions"
    );

    let users = service.cached_users(ClusterId::new(1)).await;
    let Ok(users) = users else {
        panic!("expected cached users");
    };
    assert_eq!(
        users.iter().map(|user| user.username.as_str()).collect::<Vec<_>>(),
        vec!["admin", "alice", "bob"]
    );
    assert_eq!(
        service.cached_counts(ClusterId::new(1)).await.ok(),
        Some((3, 10))
    );

    let statuses = clusters.statuses.lock().await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].0, ClusterId::new(1));
    assert_eq!(statuses[0].2, ScanStatus::Success);
}

#[tokio::test]
async fn failed_permission_read_leaves_cache_untouched() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let cache = Arc::new(FakeCacheRepository::default());
    let cluster = saved_cluster(2, "finance");

    let previous = TablePermission {
        username: "alice".to_owned(),
        schema_name: "public".to_owned(),
        table_name: "ledger".to_owned(),
        permission: PermissionKind::Select,
    };
    assert!(
        cache
            .replace_snapshot(ClusterId::new(2), &[], std::slice::from_ref(&previous))
            .await
            .is_ok()
    );

    let script = vec![
        users_table(&["alice"]),
        grants_table(&[("alice", "ledger")]),
        Err(AppError::Remote {
            message: "permission denied for relation pg_class".to_owned(),
            sql_state: Some("42501".to_owned()),
        }),
    ];
    let service = service(ScriptedConnector::new(script), clusters.clone(), cache.clone());
    let result = service.scan(&cluster).await;

    assert!(!result.success);
    assert_eq!(result.failed_phase, Some(ScanPhase::ReadingPermissions));
    assert!(result.message.starts_with("Scan failed: "));
    assert_eq!(
        result.error.as_ref().and_then(AppError::sql_state),
        Some("42501")
    );
    assert_eq!(
        service.cached_permissions(ClusterId::new(2)).await.ok(),
        Some(vec![previous])
    );
    assert_eq!(clusters.statuses.lock().await[0].2, ScanStatus::Failed);
}

#[tokio::test]
async fn connection_failure_is_reported_in_connecting_phase() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let mut connector = ScriptedConnector::new(Vec::new());
    connector.refuse = true;
    let service = service(connector, clusters.clone(), Arc::new(FakeCacheRepository::default()));

    let result = service.scan(&saved_cluster(3, "staging")).await;

    assert!(!result.success);
    assert_eq!(result.failed_phase, Some(ScanPhase::Connecting));
    assert_eq!(clusters.statuses.lock().await[0].2, ScanStatus::Failed);
}

#[tokio::test]
async fn cache_write_failure_fails_the_scan_after_successful_reads() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let cache = Arc::new(FakeCacheRepository {
        fail_writes: true,
        ..FakeCacheRepository::default()
    });
    let service = service(
        ScriptedConnector::new(full_scan_script()),
        clusters.clone(),
        cache,
    );

    let result = service.scan(&saved_cluster(4, "warehouse")).await;

    assert!(!result.success);
    assert_eq!(result.failed_phase, Some(ScanPhase::Caching));
    assert_eq!(result.user_count, 3);
    assert_eq!(clusters.statuses.lock().await[0].2, ScanStatus::Failed);
}

#[tokio::test]
async fn unsaved_cluster_is_not_scanned() {
    let connector = ScriptedConnector::new(full_scan_script());
    let fetches = connector.fetches.clone();
    let service = service(
        connector,
        Arc::new(FakeClusterRepository::default()),
        Arc::new(FakeCacheRepository::default()),
    );

    let cluster = saved_cluster(5, "draft");
    let unsaved = ClusterConfig::new(ClusterConfigInput {
        name: cluster.name().to_owned(),
        host: cluster.host().to_owned(),
        port: cluster.port(),
        database: cluster.database().to_owned(),
        cluster_type: cluster.cluster_type(),
        region: cluster.region().to_owned(),
        credential: cluster.credential().clone(),
    });
    let Ok(unsaved) = unsaved else {
        panic!("valid cluster");
    };

    let result = service.scan(&unsaved).await;
    assert!(!result.success);
    assert_eq!(*fetches.lock().await, 0);
}

#[tokio::test]
async fn concurrent_scan_of_same_cluster_is_refused() {
    let gate = Arc::new(Notify::new());
    let mut connector = ScriptedConnector::new(full_scan_script());
    connector.gate = Some(gate.clone());
    let fetches = connector.fetches.clone();
    let clusters = Arc::new(FakeClusterRepository::default());
    let service = service(connector, clusters.clone(), Arc::new(FakeCacheRepository::default()));
    let cluster = saved_cluster(6, "shared");

    let first = {
        let service = service.clone();
        let cluster = cluster.clone();
        tokio::spawn(async move { service.scan(&cluster).await })
    };
    // Wait until the first scan holds the cluster.
    while !is_scanning(&service, ClusterId::new(6)) {
        tokio::task::yield_now().await;
    }

    let second = service.scan(&cluster).await;
    assert!(!second.success);
    assert!(second.message.contains("scan already in progress"));
    assert_eq!(*fetches.lock().await, 0);

    while !first.is_finished() {
        gate.notify_one();
        tokio::task::yield_now().await;
    }
    let Ok(first) = first.await else {
        panic!("scan task panicked");
    };
    assert!(first.success, "{}", first.message);
    assert_eq!(clusters.statuses.lock().await.len(), 1);
}

#[tokio::test]
async fn scan_all_summarizes_every_cluster() {
    let clusters = Arc::new(FakeClusterRepository::default());
    clusters
        .clusters
        .lock()
        .await
        .extend([saved_cluster(7, "alpha"), saved_cluster(8, "beta")]);

    let mut script = full_scan_script();
    script.push(Err(AppError::Remote {
        message: "timeout".to_owned(),
        sql_state: None,
    }));
    let service = service(
        ScriptedConnector::new(script),
        clusters,
        Arc::new(FakeCacheRepository::default()),
    );

    let summary = service.scan_all().await;
    let Ok(summary) = summary else {
        panic!("expected summary");
    };
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.all_succeeded());
    assert_eq!(
        summary.results[1].failed_phase,
        Some(ScanPhase::ReadingUsers)
    );
}

#[tokio::test]
async fn export_filters_cached_permissions() {
    let cache = Arc::new(FakeCacheRepository::default());
    let permissions = vec![
        TablePermission {
            username: "alice".to_owned(),
            schema_name: "sales".to_owned(),
            table_name: "orders".to_owned(),
            permission: PermissionKind::Select,
        },
        TablePermission {
            username: "bob".to_owned(),
            schema_name: "finance".to_owned(),
            table_name: "ledger".to_owned(),
            permission: PermissionKind::Update,
        },
    ];
    assert!(
        cache
            .replace_snapshot(ClusterId::new(9), &[], &permissions)
            .await
            .is_ok()
    );
    let service = service(
        ScriptedConnector::new(Vec::new()),
        Arc::new(FakeClusterRepository::default()),
        cache,
    );

    let exported = service
        .export_cached_permissions(ClusterId::new(9), Some("LEDGER"))
        .await;
    let Ok(exported) = exported else {
        panic!("expected export");
    };
    assert_eq!(exported.row_count(), 1);
    assert_eq!(exported.rows()[0][0], SqlValue::from("bob"));

    let unfiltered = service
        .export_cached_permissions(ClusterId::new(9), None)
        .await
        .map(|result| result.row_count());
    assert_eq!(unfiltered.ok(), Some(2));
}

#[tokio::test]
async fn failed_user_read_leaves_cache_untouched() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let cache = Arc::new(FakeCacheRepository::default());
    let (user, permission) = previous_snapshot();
    assert!(
        cache
            .replace_snapshot(
                ClusterId::new(10),
                std::slice::from_ref(&user),
                std::slice::from_ref(&permission),
            )
            .await
            .is_ok()
    );

    let script = vec![Err(AppError::Remote {
        message: "permission denied for relation pg_user".to_owned(),
        sql_state: Some("42501".to_owned()),
    })];
    let service = service(ScriptedConnector::new(script), clusters.clone(), cache);
    let result = service.scan(&saved_cluster(10, "marketing")).await;

    assert!(!result.success);
    assert_eq!(result.failed_phase, Some(ScanPhase::ReadingUsers));
    assert_eq!(
        service.cached_users(ClusterId::new(10)).await.ok(),
        Some(vec![user])
    );
    assert_eq!(
        service.cached_permissions(ClusterId::new(10)).await.ok(),
        Some(vec![permission])
    );
    assert_eq!(clusters.statuses.lock().await[0].2, ScanStatus::Failed);
}

#[tokio::test]
async fn failed_lineage_read_leaves_cache_untouched() {
    let clusters = Arc::new(FakeClusterRepository::default());
    let cache = Arc::new(FakeCacheRepository::default());
    let (user, permission) = previous_snapshot();
    assert!(
        cache
            .replace_snapshot(
                ClusterId::new(11),
                std::slice::from_ref(&user),
                std::slice::from_ref(&permission),
            )
            .await
            .is_ok()
    );

    let mut script = full_scan_script();
    script.pop();
    script.push(Err(AppError::Remote {
        message: "permission denied for relation pg_auth_members".to_owned(),
        sql_state: Some("42501".to_owned()),
    }));
    let connector = ScriptedConnector::new(script);
    let fetches = connector.fetches.clone();
    let service = service(connector, clusters.clone(), cache);
    let result = service.scan(&saved_cluster(11, "support")).await;

    assert!(!result.success);
    assert_eq!(result.failed_phase, Some(ScanPhase::ReadingLineage));
    assert_eq!(*fetches.lock().await, 6);
    assert_eq!(
        service.cached_users(ClusterId::new(11)).await.ok(),
        Some(vec![user])
    );
    assert_eq!(
        service.cached_permissions(ClusterId::new(11)).await.ok(),
        Some(vec![permission])
    );
    assert_eq!(clusters.statuses.lock().await[0].2, ScanStatus::Failed);
}

#[tokio::test]
async fn cancelled_scan_releases_the_cluster() {
    let gate = Arc::new(Notify::new());
    let mut connector = ScriptedConnector::new(full_scan_script());
    connector.gate = Some(gate.clone());
    let service = service(
        connector,
        Arc::new(FakeClusterRepository::default()),
        Arc::new(FakeCacheRepository::default()),
    );
    let cluster = saved_cluster(12, "reporting");

    let cancelled = tokio::time::timeout(Duration::from_millis(50), service.scan(&cluster)).await;
    assert!(cancelled.is_err());
    assert!(!is_scanning(&service, ClusterId::new(12)));

    let retry = {
        let service = service.clone();
        tokio::spawn(async move { service.scan(&cluster).await })
    };
    while !retry.is_finished() {
        gate.notify_one();
        tokio::task::yield_now().await;
    }
    let Ok(retry) = retry.await else {
        panic!("scan task panicked");
    };
    assert!(retry.success, "{}", retry.message);
}

#[tokio::test]
async fn unrecorded_status_is_reported_in_the_message() {
    let clusters = Arc::new(FakeClusterRepository {
        fail_status_writes: true,
        ..FakeClusterRepository::default()
    });
    let service = service(
        ScriptedConnector::new(full_scan_script()),
        clusters,
        Arc::new(FakeCacheRepository::default()),
    );

    let result = service.scan(&saved_cluster(13, "ops")).await;

    assert!(result.success);
    assert!(
        result
            .message
            .ends_with("(scan status not recorded: internal error: database is locked)"),
        "{}",
        result.message
    );
}
