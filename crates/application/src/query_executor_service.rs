use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use guardian_core::{AppError, AppResult};
use guardian_domain::{ClusterConfig, QueryTemplate};

use crate::connection_ports::{ClusterConnection, ClusterConnector};
use crate::tabular::{SqlValue, TabularResult};

mod export;
mod parameters;
mod validation;


pub use export::{to_csv_string, write_delimited};
pub use parameters::NamedParameters;
pub use validation::{QueryValidation, validate_query};

use parameters::bind_named_parameters;

/// Per-statement time budget for ad-hoc queries.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs operator-supplied SQL against a cluster.
///
/// Every call opens and closes its own connection. Statements are validated
/// before any network call and named parameters are always bound server-side.
#[derive(Clone)]
pub struct QueryExecutorService {
    connector: Arc<dyn ClusterConnector>,
    timeout: Duration,
}

impl QueryExecutorService {
    /// Creates an executor with the default timeout.
    #[must_use]
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            connector,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Overrides the per-statement timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks a statement against the hazard rules without running it.
    #[must_use]
    pub fn validate(&self, sql: &str) -> QueryValidation {
        validate_query(sql)
    }

    /// Runs a row-returning statement.
    pub async fn execute(
        &self,
        cluster: &ClusterConfig,
        sql: &str,
        parameters: &NamedParameters,
    ) -> AppResult<TabularResult> {
        let (sql, values) = prepare(sql, parameters)?;
        let mut connection = self.connector.connect(cluster).await?;

        let outcome = timeout(self.timeout, connection.fetch(sql.as_str(), &values)).await;
        close_quietly(connection).await;

        let result = outcome.map_err(|_| self.timeout_error())??;
        info!(
            cluster = %cluster.name(),
            row_count = result.row_count(),
            "query executed"
        );
        Ok(result)
    }

    /// Runs a statement and returns the first column of the first row.
    pub async fn execute_scalar(
        &self,
        cluster: &ClusterConfig,
        sql: &str,
        parameters: &NamedParameters,
    ) -> AppResult<Option<SqlValue>> {
        let result = self.execute(cluster, sql, parameters).await?;
        Ok(result.scalar().filter(|value| !value.is_null()).cloned())
    }

    /// Runs a statement and returns the affected row count.
    pub async fn execute_non_query(
        &self,
        cluster: &ClusterConfig,
        sql: &str,
        parameters: &NamedParameters,
    ) -> AppResult<u64> {
        let (sql, values) = prepare(sql, parameters)?;
        let mut connection = self.connector.connect(cluster).await?;

        let outcome = timeout(self.timeout, connection.execute(sql.as_str(), &values)).await;
        close_quietly(connection).await;

        let affected = outcome.map_err(|_| self.timeout_error())??;
        info!(cluster = %cluster.name(), affected, "statement executed");
        Ok(affected)
    }

    /// Returns the execution plan of a statement.
    ///
    /// The `EXPLAIN` runs inside a read-only transaction that is rolled back.
    pub async fn explain(
        &self,
        cluster: &ClusterConfig,
        sql: &str,
        parameters: &NamedParameters,
    ) -> AppResult<TabularResult> {
        let (sql, values) = prepare(sql, parameters)?;
        let explain_sql = format!("EXPLAIN {sql}");
        let mut connection = self.connector.connect(cluster).await?;

        let outcome = timeout(
            self.timeout,
            fetch_read_only(connection.as_mut(), explain_sql.as_str(), &values),
        )
        .await;
        close_quietly(connection).await;

        outcome.map_err(|_| self.timeout_error())?
    }

    /// Runs a saved template. Every declared parameter must be supplied.
    pub async fn execute_template(
        &self,
        cluster: &ClusterConfig,
        template: &QueryTemplate,
        parameters: &NamedParameters,
    ) -> AppResult<TabularResult> {
        if let Some(missing) = template
            .parameter_names()
            .iter()
            .find(|name| !parameters.contains_key(name.as_str()))
        {
            return Err(AppError::Validation(format!(
                "template '{}' requires parameter '{missing}'",
                template.name()
            )));
        }

        debug!(template = %template.name(), "executing query template");
        self.execute(cluster, template.sql(), parameters).await
    }

    fn timeout_error(&self) -> AppError {
        AppError::Timeout(format!(
            "statement exceeded {} seconds",
            self.timeout.as_secs_f64()
        ))
    }
}

fn prepare(sql: &str, parameters: &NamedParameters) -> AppResult<(String, Vec<SqlValue>)> {
    let report = validate_query(sql);
    if !report.is_valid {
        return Err(AppError::Validation(
            report
                .error_message
                .unwrap_or_else(|| "query rejected".to_owned()),
        ));
    }
    for warning in &report.warnings {
        warn!(warning = %warning, "query hazard");
    }

    bind_named_parameters(sql.trim(), parameters)
}

async fn fetch_read_only(
    connection: &mut dyn ClusterConnection,
    sql: &str,
    values: &[SqlValue],
) -> AppResult<TabularResult> {
    connection.execute("BEGIN READ ONLY", &[]).await?;
    let fetched = connection.fetch(sql, values).await;
    let rolled_back = connection.execute("ROLLBACK", &[]).await;

    let result = fetched?;
    rolled_back?;
    Ok(result)
}

async fn close_quietly(connection: Box<dyn ClusterConnection>) {
    if let Err(error) = connection.close().await {
        debug!(error = %error, "failed to close query connection");
    }
}
