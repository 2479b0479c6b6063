use chrono::{DateTime, Utc};

use guardian_core::{AppError, AppResult};
use guardian_domain::{MASKED_SECRET, PermissionKind, escape_literal, quote_identifier};

/// Parameters of a `CREATE USER` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserRequest {
    /// Login name.
    pub username: String,
    /// Initial password. Never logged or returned in clear text.
    pub password: String,
    /// Maximum concurrent connections.
    pub connection_limit: Option<u32>,
    /// Password expiry.
    pub valid_until: Option<DateTime<Utc>>,
    /// Grants `CREATEDB`.
    pub create_db: bool,
    /// Grants `CREATEUSER`.
    pub create_user: bool,
}

/// Structured access-control change. Each request renders to one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRequest {
    /// `GRANT .. ON schema.table TO user`.
    GrantTable {
        /// Schema holding the table.
        schema: String,
        /// Table name.
        table: String,
        /// Receiving user.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Appends `WITH GRANT OPTION`.
        with_grant_option: bool,
    },
    /// `GRANT .. ON SCHEMA schema TO user`.
    GrantSchema {
        /// Target schema.
        schema: String,
        /// Receiving user.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Appends `WITH GRANT OPTION`.
        with_grant_option: bool,
    },
    /// `GRANT .. ON ALL TABLES IN SCHEMA schema TO user`.
    GrantAllTablesInSchema {
        /// Target schema.
        schema: String,
        /// Receiving user.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Appends `WITH GRANT OPTION`.
        with_grant_option: bool,
    },
    /// `REVOKE .. ON schema.table FROM user`.
    RevokeTable {
        /// Schema holding the table.
        schema: String,
        /// Table name.
        table: String,
        /// User losing the privileges.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Appends `CASCADE`.
        cascade: bool,
    },
    /// `REVOKE .. ON SCHEMA schema FROM user`.
    RevokeSchema {
        /// Target schema.
        schema: String,
        /// User losing the privileges.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Appends `CASCADE`.
        cascade: bool,
    },
    /// `REVOKE ALL ON schema.table FROM user`.
    RevokeAll {
        /// Schema holding the table.
        schema: String,
        /// Table name.
        table: String,
        /// User losing the privileges.
        grantee: String,
        /// Appends `CASCADE`.
        cascade: bool,
    },
    /// `CREATE USER`.
    CreateUser(CreateUserRequest),
    /// `ALTER USER .. WITH PASSWORD`.
    AlterUserPassword {
        /// Login name.
        username: String,
        /// New password.
        password: String,
    },
    /// `DROP USER`.
    DropUser {
        /// Login name.
        username: String,
    },
    /// `CREATE GROUP`.
    CreateGroup {
        /// Group name.
        group: String,
    },
    /// `ALTER GROUP .. ADD USER`.
    AddGroupMember {
        /// Group name.
        group: String,
        /// Member login name.
        username: String,
    },
    /// `ALTER GROUP .. DROP USER`.
    RemoveGroupMember {
        /// Group name.
        group: String,
        /// Member login name.
        username: String,
    },
    /// `DROP GROUP`.
    DropGroup {
        /// Group name.
        group: String,
    },
    /// `ALTER DEFAULT PRIVILEGES .. IN SCHEMA .. GRANT .. ON TABLES TO ..`.
    AlterDefaultPrivileges {
        /// Schema the defaults apply to.
        schema: String,
        /// Receiving user.
        grantee: String,
        /// Privilege keywords.
        permissions: Vec<String>,
        /// Owner whose future tables are covered, defaults to the session user.
        owner: Option<String>,
    },
}

/// Statement text ready to execute plus its audit form with secrets masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    /// Text sent to the cluster.
    pub sql: String,
    /// Text safe to log and show.
    pub audit_sql: String,
}

impl RenderedStatement {
    fn plain(sql: String) -> Self {
        Self {
            audit_sql: sql.clone(),
            sql,
        }
    }
}

impl PermissionRequest {
    /// Validates the request and renders its statement.
    ///
    /// Every identifier is quoted and every privilege keyword is checked
    /// against the allow-list before any text is produced.
    pub fn render(&self) -> AppResult<RenderedStatement> {
        match self {
            Self::GrantTable {
                schema,
                table,
                grantee,
                permissions,
                with_grant_option,
            } => Ok(RenderedStatement::plain(format!(
                "GRANT {} ON {}.{} TO {}{}",
                privileges(permissions)?,
                identifier(schema, "schema name")?,
                identifier(table, "table name")?,
                identifier(grantee, "username")?,
                grant_option(*with_grant_option),
            ))),
            Self::GrantSchema {
                schema,
                grantee,
                permissions,
                with_grant_option,
            } => Ok(RenderedStatement::plain(format!(
                "GRANT {} ON SCHEMA {} TO {}{}",
                privileges(permissions)?,
                identifier(schema, "schema name")?,
                identifier(grantee, "username")?,
                grant_option(*with_grant_option),
            ))),
            Self::GrantAllTablesInSchema {
                schema,
                grantee,
                permissions,
                with_grant_option,
            } => Ok(RenderedStatement::plain(format!(
                "GRANT {} ON ALL TABLES IN SCHEMA {} TO {}{}",
                privileges(permissions)?,
                identifier(schema, "schema name")?,
                identifier(grantee, "username")?,
                grant_option(*with_grant_option),
            ))),
            Self::RevokeTable {
                schema,
                table,
                grantee,
                permissions,
                cascade,
            } => Ok(RenderedStatement::plain(format!(
                "REVOKE {} ON {}.{} FROM {}{}",
                privileges(permissions)?,
                identifier(schema, "schema name")?,
                identifier(table, "table name")?,
                identifier(grantee, "username")?,
                cascade_clause(*cascade),
            ))),
            Self::RevokeSchema {
                schema,
                grantee,
                permissions,
                cascade,
            } => Ok(RenderedStatement::plain(format!(
                "REVOKE {} ON SCHEMA {} FROM {}{}",
                privileges(permissions)?,
                identifier(schema, "schema name")?,
                identifier(grantee, "username")?,
                cascade_clause(*cascade),
            ))),
            Self::RevokeAll {
                schema,
                table,
                grantee,
                cascade,
            } => Ok(RenderedStatement::plain(format!(
                "REVOKE ALL ON {}.{} FROM {}{}",
                identifier(schema, "schema name")?,
                identifier(table, "table name")?,
                identifier(grantee, "username")?,
                cascade_clause(*cascade),
            ))),
            Self::CreateUser(request) => render_create_user(request),
            Self::AlterUserPassword { username, password } => {
                let username = identifier(username, "username")?;
                let password = secret(password)?;
                Ok(RenderedStatement {
                    sql: format!("ALTER USER {username} WITH PASSWORD '{password}'"),
                    audit_sql: format!("ALTER USER {username} WITH PASSWORD '{MASKED_SECRET}'"),
                })
            }
            Self::DropUser { username } => Ok(RenderedStatement::plain(format!(
                "DROP USER {}",
                identifier(username, "username")?
            ))),
            Self::CreateGroup { group } => Ok(RenderedStatement::plain(format!(
                "CREATE GROUP {}",
                identifier(group, "group name")?
            ))),
            Self::AddGroupMember { group, username } => Ok(RenderedStatement::plain(format!(
                "ALTER GROUP {} ADD USER {}",
                identifier(group, "group name")?,
                identifier(username, "username")?
            ))),
            Self::RemoveGroupMember { group, username } => {
                Ok(RenderedStatement::plain(format!(
                    "ALTER GROUP {} DROP USER {}",
                    identifier(group, "group name")?,
                    identifier(username, "username")?
                )))
            }
            Self::DropGroup { group } => Ok(RenderedStatement::plain(format!(
                "DROP GROUP {}",
                identifier(group, "group name")?
            ))),
            Self::AlterDefaultPrivileges {
                schema,
                grantee,
                permissions,
                owner,
            } => {
                let owner_clause = match owner.as_deref() {
                    Some(owner) if !owner.trim().is_empty() => {
                        format!(" FOR USER {}", identifier(owner, "owner")?)
                    }
                    _ => String::new(),
                };
                Ok(RenderedStatement::plain(format!(
                    "ALTER DEFAULT PRIVILEGES{owner_clause} IN SCHEMA {} GRANT {} ON TABLES TO {}",
                    identifier(schema, "schema name")?,
                    privileges(permissions)?,
                    identifier(grantee, "username")?,
                )))
            }
        }
    }

    /// Returns the operator-facing message for a successful execution.
    #[must_use]
    pub fn success_message(&self) -> String {
        match self {
            Self::GrantTable {
                schema,
                table,
                grantee,
                permissions,
                ..
            } => format!(
                "Granted {} on {schema}.{table} to {grantee}",
                display_list(permissions)
            ),
            Self::GrantSchema {
                schema,
                grantee,
                permissions,
                ..
            } => format!(
                "Granted {} on schema {schema} to {grantee}",
                display_list(permissions)
            ),
            Self::GrantAllTablesInSchema {
                schema,
                grantee,
                permissions,
                ..
            } => format!(
                "Granted {} on all tables in schema {schema} to {grantee}",
                display_list(permissions)
            ),
            Self::RevokeTable {
                schema,
                table,
                grantee,
                permissions,
                ..
            } => format!(
                "Revoked {} on {schema}.{table} from {grantee}",
                display_list(permissions)
            ),
            Self::RevokeSchema {
                schema,
                grantee,
                permissions,
                ..
            } => format!(
                "Revoked {} on schema {schema} from {grantee}",
                display_list(permissions)
            ),
            Self::RevokeAll {
                schema,
                table,
                grantee,
                ..
            } => format!("Revoked all permissions on {schema}.{table} from {grantee}"),
            Self::CreateUser(request) => {
                format!("User created successfully: {}", request.username)
            }
            Self::AlterUserPassword { username, .. } => {
                format!("Password changed successfully for user: {username}")
            }
            Self::DropUser { username } => format!("User dropped successfully: {username}"),
            Self::CreateGroup { group } => format!("Group created successfully: {group}"),
            Self::AddGroupMember { group, username } => {
                format!("Added user {username} to group {group}")
            }
            Self::RemoveGroupMember { group, username } => {
                format!("Removed user {username} from group {group}")
            }
            Self::DropGroup { group } => format!("Group dropped successfully: {group}"),
            Self::AlterDefaultPrivileges {
                schema, grantee, ..
            } => format!("Set default privileges in schema {schema} for {grantee}"),
        }
    }

    /// Returns the prefix used in failure messages.
    #[must_use]
    pub fn failure_label(&self) -> &'static str {
        match self {
            Self::GrantTable { .. } => "Grant operation failed",
            Self::GrantSchema { .. } => "Grant schema operation failed",
            Self::GrantAllTablesInSchema { .. } => "Grant all tables operation failed",
            Self::RevokeTable { .. } => "Revoke operation failed",
            Self::RevokeSchema { .. } => "Revoke schema operation failed",
            Self::RevokeAll { .. } => "Revoke all operation failed",
            Self::CreateUser(_) => "Create user failed",
            Self::AlterUserPassword { .. } => "Alter user password failed",
            Self::DropUser { .. } => "Drop user failed",
            Self::CreateGroup { .. } => "Create group failed",
            Self::AddGroupMember { .. } => "Add user to group failed",
            Self::RemoveGroupMember { .. } => "Remove user from group failed",
            Self::DropGroup { .. } => "Drop group failed",
            Self::AlterDefaultPrivileges { .. } => "Alter default privileges failed",
        }
    }
}

fn render_create_user(request: &CreateUserRequest) -> AppResult<RenderedStatement> {
    let CreateUserRequest {
        username,
        password,
        connection_limit,
        valid_until,
        create_db,
        create_user,
    } = request;

    let username = identifier(username, "username")?;
    let password = secret(password)?;

    let mut options = String::new();
    if let Some(limit) = connection_limit {
        options.push_str(format!(" CONNECTION LIMIT {limit}").as_str());
    }
    if let Some(valid_until) = valid_until {
        options.push_str(format!(" VALID UNTIL '{}'", valid_until.format("%Y-%m-%d %H:%M:%S")).as_str());
    }
    if *create_db {
        options.push_str(" CREATEDB");
    }
    if *create_user {
        options.push_str(" CREATEUSER");
    }

    Ok(RenderedStatement {
        sql: format!("CREATE USER {username} WITH PASSWORD '{password}'{options}"),
        audit_sql: format!("CREATE USER {username} WITH PASSWORD '{MASKED_SECRET}'{options}"),
    })
}

fn identifier(value: &str, label: &str) -> AppResult<String> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} is required")));
    }
    // Quoted names keep surrounding blanks, so " sales" is a different object.
    if value.trim() != value {
        return Err(AppError::Validation(format!(
            "{label} '{value}' has leading or trailing whitespace"
        )));
    }

    Ok(quote_identifier(value))
}

fn secret(value: &str) -> AppResult<String> {
    if value.is_empty() {
        return Err(AppError::Validation("password is required".to_owned()));
    }

    Ok(escape_literal(value))
}

fn privileges(values: &[String]) -> AppResult<String> {
    let trimmed: Vec<&str> = values.iter().map(|value| value.trim()).collect();
    Ok(PermissionKind::render_list(&PermissionKind::parse_list(&trimmed)?))
}

fn display_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| value.trim().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn grant_option(enabled: bool) -> &'static str {
    if enabled { " WITH GRANT OPTION" } else { "" }
}

fn cascade_clause(enabled: bool) -> &'static str {
    if enabled { " CASCADE" } else { "" }
}
