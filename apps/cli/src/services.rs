use std::sync::Arc;

use guardian_application::{
    ClusterConnector, ClusterService, PermissionService, QueryExecutorService,
    QueryLibraryService, ScanService,
};
use guardian_core::AppResult;
use guardian_infrastructure::{EnvCredentialSource, RedshiftConnector, SqliteCacheStore};
use tracing::debug;

use crate::commands::Services;
use crate::config::GuardianConfig;

/// Opens the cache store and wires every service for one invocation.
pub async fn build_services(config: &GuardianConfig, allow_writes: bool) -> AppResult<Services> {
    let store = SqliteCacheStore::open(config.database_path.as_path()).await?;
    debug!(path = %config.database_path.display(), "cache store opened");

    let connector: Arc<dyn ClusterConnector> = Arc::new(
        RedshiftConnector::new(Arc::new(EnvCredentialSource::from_env()))
            .with_connect_timeout(config.connect_timeout),
    );
    let cluster_repository = Arc::new(store.cluster_repository());
    let cache_repository = Arc::new(store.permission_cache_repository());

    let library = QueryLibraryService::new(Arc::new(store.query_template_repository()));
    let seeded = library.ensure_built_in_templates().await?;
    if seeded > 0 {
        debug!(seeded, "built-in query templates installed");
    }

    let mut permissions = PermissionService::new(connector.clone());
    permissions.set_read_only(config.read_only && !allow_writes);

    Ok(Services {
        clusters: ClusterService::new(cluster_repository.clone(), connector.clone()),
        scans: ScanService::new(connector.clone(), cluster_repository, cache_repository),
        queries: QueryExecutorService::new(connector).with_timeout(config.query_timeout),
        permissions,
        library,
    })
}
