//! Application services and ports.

#![forbid(unsafe_code)]

mod cache_ports;
mod catalog_reader;
mod cluster_service;
mod connection_ports;
mod permission_service;
mod query_executor_service;
mod query_library_service;
mod scan_service;
mod tabular;

pub use cache_ports::{ClusterRepository, PermissionCacheRepository, QueryTemplateRepository};
pub use catalog_reader::CatalogReader;
pub use cluster_service::{ClusterService, ConnectionCheck};
pub use connection_ports::{ClusterConnection, ClusterConnector};
pub use permission_service::{
    CreateUserRequest, PermissionOperationResult, PermissionRequest, PermissionService,
    READ_ONLY_MESSAGE, RenderedStatement,
};
pub use query_executor_service::{
    DEFAULT_QUERY_TIMEOUT, NamedParameters, QueryExecutorService, QueryValidation, to_csv_string,
    validate_query, write_delimited,
};
pub use query_library_service::QueryLibraryService;
pub use scan_service::{ScanPhase, ScanResult, ScanService, ScanSummary};
pub use tabular::{RowView, SqlValue, TabularColumn, TabularResult};
