use std::sync::Arc;

use tracing::{debug, info, warn};

use guardian_core::{AppError, AppResult};
use guardian_domain::ClusterConfig;

use crate::connection_ports::ClusterConnector;

mod statements;


pub use statements::{CreateUserRequest, PermissionRequest, RenderedStatement};

/// Message returned for every mutation refused by read-only mode.
pub const READ_ONLY_MESSAGE: &str = "read-only mode";

/// Outcome of one access-control change.
#[derive(Debug)]
pub struct PermissionOperationResult {
    /// Whether the statement ran successfully.
    pub success: bool,
    /// Operator-facing summary.
    pub message: String,
    /// Statement executed, or that would have run in read-only mode. Secrets masked.
    pub sql: Option<String>,
    /// Failure cause.
    pub error: Option<AppError>,
}

/// Applies GRANT, REVOKE, user and group changes to a live cluster.
///
/// Starts in read-only mode: requests are rendered for review but nothing is sent.
#[derive(Clone)]
pub struct PermissionService {
    connector: Arc<dyn ClusterConnector>,
    read_only: bool,
}

impl PermissionService {
    /// Creates a mutation service in read-only mode.
    #[must_use]
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            connector,
            read_only: true,
        }
    }

    /// Enables or disables read-only mode.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Returns whether mutations are suppressed.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Validates and renders a request without executing it.
    pub fn preview(&self, request: &PermissionRequest) -> AppResult<RenderedStatement> {
        request.render()
    }

    /// Renders, executes and reports one request. Never returns an error.
    pub async fn apply(
        &self,
        cluster: &ClusterConfig,
        request: &PermissionRequest,
    ) -> PermissionOperationResult {
        let statement = match request.render() {
            Ok(statement) => statement,
            Err(error) => {
                return PermissionOperationResult {
                    success: false,
                    message: format!("{}: {error}", request.failure_label()),
                    sql: None,
                    error: Some(error),
                };
            }
        };

        if self.read_only {
            info!(
                cluster = %cluster.name(),
                sql = %statement.audit_sql,
                "read-only mode, statement not executed"
            );
            return PermissionOperationResult {
                success: false,
                message: READ_ONLY_MESSAGE.to_owned(),
                sql: Some(statement.audit_sql),
                error: None,
            };
        }

        match self.execute(cluster, statement.sql.as_str()).await {
            Ok(()) => {
                info!(cluster = %cluster.name(), sql = %statement.audit_sql, "permission change applied");
                PermissionOperationResult {
                    success: true,
                    message: request.success_message(),
                    sql: Some(statement.audit_sql),
                    error: None,
                }
            }
            Err(error) => {
                warn!(
                    cluster = %cluster.name(),
                    sql = %statement.audit_sql,
                    error = %error,
                    "permission change failed"
                );
                PermissionOperationResult {
                    success: false,
                    message: format!("{}: {error}", request.failure_label()),
                    sql: Some(statement.audit_sql),
                    error: Some(error),
                }
            }
        }
    }

    async fn execute(&self, cluster: &ClusterConfig, sql: &str) -> AppResult<()> {
        let mut connection = self.connector.connect(cluster).await?;
        let executed = connection.execute(sql, &[]).await;
        if let Err(error) = connection.close().await {
            debug!(error = %error, "failed to close mutation connection");
        }
        executed.map(|_| ())
    }
}
