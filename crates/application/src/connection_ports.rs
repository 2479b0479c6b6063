use async_trait::async_trait;

use guardian_core::AppResult;
use guardian_domain::ClusterConfig;

use crate::tabular::{SqlValue, TabularResult};

/// Opens connections to a remote cluster.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Opens a new TLS connection for the given cluster.
    async fn connect(&self, cluster: &ClusterConfig) -> AppResult<Box<dyn ClusterConnection>>;

    /// Returns a connection description safe to show to operators.
    fn describe(&self, cluster: &ClusterConfig) -> String;
}

/// Single live connection owned by one operation.
///
/// Connections are never shared between concurrent operations.
#[async_trait]
pub trait ClusterConnection: Send {
    /// Runs a row-returning statement with positional `$n` parameters.
    async fn fetch(&mut self, sql: &str, parameters: &[SqlValue]) -> AppResult<TabularResult>;

    /// Runs a statement and returns the affected row count.
    async fn execute(&mut self, sql: &str, parameters: &[SqlValue]) -> AppResult<u64>;

    /// Closes the connection gracefully.
    async fn close(self: Box<Self>) -> AppResult<()>;
}
