//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod redshift_connector;
mod sqlite_cache_store;
mod sqlite_cluster_repository;
mod sqlite_permission_cache_repository;
mod sqlite_query_template_repository;

pub use redshift_connector::{
    ClusterCredentials, CredentialSource, DEFAULT_CONNECT_TIMEOUT, EnvCredentialSource,
    RedshiftConnection, RedshiftConnector, StaticCredentialSource, env_key_segment,
};
pub use sqlite_cache_store::SqliteCacheStore;
pub use sqlite_cluster_repository::SqliteClusterRepository;
pub use sqlite_permission_cache_repository::SqlitePermissionCacheRepository;
pub use sqlite_query_template_repository::SqliteQueryTemplateRepository;
