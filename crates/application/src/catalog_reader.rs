use guardian_core::AppResult;
use guardian_domain::{
    ClusterConfig, PermissionKind, RemoteUser, RoleLineage, SYSTEM_SCHEMAS, TablePermission,
    quote_literal,
};
use tracing::{debug, warn};

use crate::connection_ports::{ClusterConnection, ClusterConnector};
use crate::tabular::SqlValue;

const LIST_USERS_SQL: &str = r#"
SELECT
    usename AS username,
    usesysid AS user_id,
    usesuper AS is_superuser,
    usecreatedb AS can_create_db,
    usecatupd AS can_create_user,
    CASE
        WHEN valuntil IS NULL OR valuntil = 'infinity' THEN NULL
        ELSE valuntil::timestamp
    END AS valid_until
FROM pg_user
ORDER BY usename
"#;

const LIST_ROLE_LINEAGE_SQL: &str = r#"
SELECT
    granted.usename AS granted_role,
    grantor.usename AS grantor,
    m.admin_option AS admin_option
FROM pg_auth_members m
JOIN pg_user granted ON m.member = granted.usesysid
JOIN pg_user grantor ON m.grantor = grantor.usesysid
ORDER BY granted.usename, grantor.usename
"#;

const ROUND_TRIP_SQL: &str = "SELECT 1";

fn system_schema_list() -> String {
    SYSTEM_SCHEMAS
        .iter()
        .map(|schema| quote_literal(schema))
        .collect::<Vec<_>>()
        .join(", ")
}

fn table_permission_sql() -> String {
    format!(
        r#"
SELECT DISTINCT
    u.usename AS username,
    n.nspname AS schema_name,
    c.relname AS table_name
FROM pg_user u
CROSS JOIN pg_class c
JOIN pg_namespace n ON c.relnamespace = n.oid
WHERE c.relkind = 'r'
  AND n.nspname NOT IN ({})
  AND has_table_privilege(u.usename, c.oid, $1)
ORDER BY username, schema_name, table_name
"#,
        system_schema_list()
    )
}

fn schema_usage_sql() -> String {
    format!(
        r#"
SELECT DISTINCT nspname AS schema_name
FROM pg_namespace
WHERE has_schema_privilege($1, nspname, 'USAGE')
  AND nspname NOT IN ({})
ORDER BY nspname
"#,
        system_schema_list()
    )
}

/// Read-only extraction of users, grants and role lineage from a cluster catalog.
///
/// Any failed query aborts the whole read; remote errors keep their SQLSTATE.
pub struct CatalogReader<'a> {
    connection: &'a mut dyn ClusterConnection,
}

impl<'a> CatalogReader<'a> {
    /// Creates a reader over an open connection.
    #[must_use]
    pub fn new(connection: &'a mut dyn ClusterConnection) -> Self {
        Self { connection }
    }

    /// Lists all database users ordered by username.
    pub async fn list_users(&mut self) -> AppResult<Vec<RemoteUser>> {
        let result = self.connection.fetch(LIST_USERS_SQL, &[]).await?;

        let users = result
            .iter_rows()
            .map(|row| {
                Ok(RemoteUser {
                    username: row.text("username")?,
                    user_id: row.int("user_id")?,
                    is_superuser: row.bool("is_superuser")?,
                    can_create_db: row.bool("can_create_db")?,
                    can_create_user: row.bool("can_create_user")?,
                    valid_until: row.optional_timestamp("valid_until")?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        debug!(user_count = users.len(), "read remote users");
        Ok(users)
    }

    /// Lists table privileges for every user, one catalog query per scanned kind.
    ///
    /// Results are concatenated in kind order: SELECT, INSERT, UPDATE, DELETE.
    pub async fn list_table_permissions(&mut self) -> AppResult<Vec<TablePermission>> {
        let sql = table_permission_sql();
        let mut permissions = Vec::new();

        for kind in PermissionKind::scanned() {
            let result = self
                .connection
                .fetch(sql.as_str(), &[SqlValue::from(kind.as_str())])
                .await?;

            for row in result.iter_rows() {
                permissions.push(TablePermission {
                    username: row.text("username")?,
                    schema_name: row.text("schema_name")?,
                    table_name: row.text("table_name")?,
                    permission: *kind,
                });
            }

            debug!(permission = %kind, total = permissions.len(), "read table privileges");
        }

        Ok(permissions)
    }

    /// Lists role memberships ordered by granted role, then grantor.
    pub async fn list_role_lineage(&mut self) -> AppResult<Vec<RoleLineage>> {
        let result = self.connection.fetch(LIST_ROLE_LINEAGE_SQL, &[]).await?;

        result
            .iter_rows()
            .map(|row| {
                Ok(RoleLineage {
                    granted_role: row.text("granted_role")?,
                    grantor: row.text("grantor")?,
                    admin_option: row.bool("admin_option")?,
                })
            })
            .collect()
    }

    /// Lists non-system schemas on which the user holds `USAGE`.
    pub async fn list_schema_usage(&mut self, username: &str) -> AppResult<Vec<String>> {
        let result = self
            .connection
            .fetch(schema_usage_sql().as_str(), &[SqlValue::from(username)])
            .await?;

        result.iter_rows().map(|row| row.text("schema_name")).collect()
    }

    /// Opens a connection, runs a round-trip query and closes it.
    ///
    /// Returns `false` on any failure or an unexpected scalar.
    pub async fn test_connection(connector: &dyn ClusterConnector, cluster: &ClusterConfig) -> bool {
        let mut connection = match connector.connect(cluster).await {
            Ok(connection) => connection,
            Err(error) => {
                warn!(cluster = %cluster.name(), error = %error, "connection test failed to connect");
                return false;
            }
        };

        let reachable = match connection.fetch(ROUND_TRIP_SQL, &[]).await {
            Ok(result) => result.scalar().and_then(SqlValue::as_i64) == Some(1),
            Err(error) => {
                warn!(cluster = %cluster.name(), error = %error, "connection test query failed");
                false
            }
        };

        if let Err(error) = connection.close().await {
            debug!(cluster = %cluster.name(), error = %error, "failed to close test connection");
        }

        reachable
    }
}
