use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::debug;

use guardian_application::{ClusterConnection, ClusterConnector, SqlValue, TabularResult};
use guardian_core::{AppError, AppResult};
use guardian_domain::{ClusterConfig, CredentialMode};

mod credentials;
mod values;


pub use credentials::{
    ClusterCredentials, CredentialSource, EnvCredentialSource, StaticCredentialSource,
    env_key_segment,
};

/// Connect timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const APPLICATION_NAME: &str = "guardian";

/// Opens TLS connections to Redshift-compatible clusters over the PostgreSQL wire protocol.
#[derive(Clone)]
pub struct RedshiftConnector {
    credentials: Arc<dyn CredentialSource>,
    connect_timeout: Duration,
}

impl RedshiftConnector {
    /// Creates a connector resolving logins through the given source.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn connect_options(
        cluster: &ClusterConfig,
        credentials: &ClusterCredentials,
    ) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(cluster.host())
            .port(cluster.port())
            .database(cluster.database())
            .username(credentials.username())
            .password(credentials.password())
            .ssl_mode(PgSslMode::Require)
            .application_name(APPLICATION_NAME)
            .extra_float_digits(None::<i8>)
            .disable_statement_logging()
    }
}

/// Maps a driver failure, keeping the server's SQLSTATE when present.
pub(crate) fn remote_error(error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(database_error) => AppError::Remote {
            message: database_error.message().to_owned(),
            sql_state: database_error.code().map(|code| code.into_owned()),
        },
        _ => AppError::Remote {
            message: error.to_string(),
            sql_state: None,
        },
    }
}

#[async_trait]
impl ClusterConnector for RedshiftConnector {
    async fn connect(&self, cluster: &ClusterConfig) -> AppResult<Box<dyn ClusterConnection>> {
        let credentials = self.credentials.resolve(cluster)?;
        let options = Self::connect_options(cluster, &credentials);

        let connection = tokio::time::timeout(self.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "connecting to {} timed out after {}s",
                    self.describe(cluster),
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(remote_error)?;

        debug!(cluster = %cluster.name(), user = %credentials.username(), "opened cluster connection");
        Ok(Box::new(RedshiftConnection { connection }))
    }

    fn describe(&self, cluster: &ClusterConfig) -> String {
        let user = match cluster.credential() {
            CredentialMode::Profile { profile } => format!("profile:{profile}"),
            CredentialMode::Password { username } => username.clone(),
        };

        format!(
            "host={} port={} dbname={} user={} password=**** sslmode=require",
            cluster.host(),
            cluster.port(),
            cluster.database(),
            user
        )
    }
}

/// One live wire-protocol session.
pub struct RedshiftConnection {
    connection: PgConnection,
}

#[async_trait]
impl ClusterConnection for RedshiftConnection {
    async fn fetch(&mut self, sql: &str, parameters: &[SqlValue]) -> AppResult<TabularResult> {
        let connection: &mut PgConnection = &mut self.connection;
        // Parameterless statements use the simple protocol so every value arrives as text.
        let rows = if parameters.is_empty() {
            connection.fetch_all(sqlx::raw_sql(sql)).await
        } else {
            parameters
                .iter()
                .fold(sqlx::query(sql), values::bind_value)
                .fetch_all(&mut *connection)
                .await
        }
        .map_err(remote_error)?;

        let columns = match rows.first() {
            Some(row) => sqlx::Row::columns(row)
                .iter()
                .map(values::tabular_column)
                .collect(),
            None => match (&mut *connection).describe(sql).await {
                Ok(description) => description
                    .columns()
                    .iter()
                    .map(values::tabular_column)
                    .collect(),
                Err(error) => {
                    debug!(error = %error, "could not describe empty result");
                    Vec::new()
                }
            },
        };

        let mut result = TabularResult::new(columns);
        for row in &rows {
            result.push_row(values::decode_row(row)?)?;
        }

        Ok(result)
    }

    async fn execute(&mut self, sql: &str, parameters: &[SqlValue]) -> AppResult<u64> {
        let connection: &mut PgConnection = &mut self.connection;
        let outcome = if parameters.is_empty() {
            connection.execute(sqlx::raw_sql(sql)).await
        } else {
            parameters
                .iter()
                .fold(sqlx::query(sql), values::bind_value)
                .execute(&mut *connection)
                .await
        }
        .map_err(remote_error)?;

        Ok(outcome.rows_affected())
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.connection.close().await.map_err(remote_error)
    }
}
