use std::path::Path;

use tracing::info;

use guardian_application::{
    ClusterService, CreateUserRequest, NamedParameters, PermissionRequest, PermissionService,
    QueryExecutorService, QueryLibraryService, ScanResult, ScanService, SqlValue, TabularColumn,
    TabularResult,
};
use guardian_core::{AppError, AppResult};
use guardian_domain::{ClusterConfig, ClusterConfigInput, CredentialMode};

use crate::cli_args::{
    AddClusterArgs, Command, CreateUserArgs, ExportArgs, GrantArgs, GrantTarget, PermissionsArgs,
    QueryArgs, RevokeArgs, ScanArgs, TemplatesArgs,
};
use crate::output::{self, OutputFormat};

/// Services wired for one CLI invocation.
pub struct Services {
    pub clusters: ClusterService,
    pub scans: ScanService,
    pub queries: QueryExecutorService,
    pub permissions: PermissionService,
    pub library: QueryLibraryService,
}

/// Runs one command. `Ok(false)` reports a handled failure that should exit non-zero.
pub async fn run(services: &Services, command: Command) -> AppResult<bool> {
    match command {
        Command::List => list_clusters(services).await,
        Command::Add(args) => add_cluster(services, args).await,
        Command::Remove(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            services.clusters.delete_cluster(cluster_id(&cluster)?).await?;
            println!("Removed cluster '{}'", cluster.name());
            Ok(true)
        }
        Command::Test(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let check = services.clusters.test_connection(&cluster).await;
            println!("{}", check.message);
            Ok(check.ok)
        }
        Command::Scan(args) => scan(services, args).await,
        Command::Users(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let users = services.scans.cached_users(cluster_id(&cluster)?).await?;
            let mut result = TabularResult::new(vec![
                TabularColumn::new("Username", "text"),
                TabularColumn::new("User Id", "int8"),
                TabularColumn::new("Superuser", "bool"),
                TabularColumn::new("Create DB", "bool"),
                TabularColumn::new("Create User", "bool"),
                TabularColumn::new("Valid Until", "timestamptz"),
            ]);
            for user in users {
                result.push_row(vec![
                    SqlValue::from(user.username),
                    SqlValue::Int(user.user_id),
                    SqlValue::Bool(user.is_superuser),
                    SqlValue::Bool(user.can_create_db),
                    SqlValue::Bool(user.can_create_user),
                    user.valid_until.map_or(SqlValue::Null, SqlValue::Timestamp),
                ])?;
            }
            println!("{}", output::render_table(&result));
            Ok(true)
        }
        Command::Permissions(args) => show_permissions(services, args).await,
        Command::Query(args) => query(services, args).await,
        Command::Export(args) => export(services, args).await,
        Command::Templates(args) => templates(services, args).await,
        Command::Grant(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = grant_request(args)?;
            Ok(apply(services, &cluster, &request).await)
        }
        Command::Revoke(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = revoke_request(args);
            Ok(apply(services, &cluster, &request).await)
        }
        Command::CreateUser(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = create_user_request(args);
            Ok(apply(services, &cluster, &request).await)
        }
        Command::SetPassword(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::AlterUserPassword {
                username: args.username,
                password: args.password,
            };
            Ok(apply(services, &cluster, &request).await)
        }
        Command::DropUser(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::DropUser {
                username: args.username,
            };
            Ok(apply(services, &cluster, &request).await)
        }
        Command::CreateGroup(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::CreateGroup { group: args.group };
            Ok(apply(services, &cluster, &request).await)
        }
        Command::DropGroup(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::DropGroup { group: args.group };
            Ok(apply(services, &cluster, &request).await)
        }
        Command::AddMember(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::AddGroupMember {
                group: args.group,
                username: args.username,
            };
            Ok(apply(services, &cluster, &request).await)
        }
        Command::RemoveMember(args) => {
            let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
            let request = PermissionRequest::RemoveGroupMember {
                group: args.group,
                username: args.username,
            };
            Ok(apply(services, &cluster, &request).await)
        }
    }
}

fn cluster_id(cluster: &ClusterConfig) -> AppResult<guardian_core::ClusterId> {
    cluster.id().ok_or_else(|| {
        AppError::Internal(format!("cluster '{}' has no stored id", cluster.name()))
    })
}

async fn list_clusters(services: &Services) -> AppResult<bool> {
    let clusters = services.clusters.list_clusters().await?;
    let mut result = TabularResult::new(
        ["Id", "Name", "Host", "Port", "Database", "Type", "Region", "Credential", "Last Scan", "Status"]
            .into_iter()
            .map(|name| TabularColumn::new(name, "text"))
            .collect(),
    );

    for cluster in &clusters {
        let credential = match cluster.credential() {
            CredentialMode::Profile { profile } => format!("profile {profile}"),
            CredentialMode::Password { username } => format!("password {username}"),
        };
        result.push_row(vec![
            cluster
                .id()
                .map_or(SqlValue::Null, |id| SqlValue::Int(id.as_i64())),
            SqlValue::from(cluster.name()),
            SqlValue::from(cluster.host()),
            SqlValue::Int(i64::from(cluster.port())),
            SqlValue::from(cluster.database()),
            SqlValue::from(cluster.cluster_type().as_str()),
            SqlValue::from(cluster.region()),
            SqlValue::from(credential),
            cluster
                .last_scan_at()
                .map_or(SqlValue::Null, SqlValue::Timestamp),
            cluster
                .last_scan_status()
                .map_or(SqlValue::Null, |status| SqlValue::from(status.as_str())),
        ])?;
    }

    println!("{}", output::render_table(&result));
    Ok(true)
}

async fn add_cluster(services: &Services, args: AddClusterArgs) -> AppResult<bool> {
    let credential = match args.username {
        Some(username) => CredentialMode::Password { username },
        None => CredentialMode::Profile {
            profile: args.profile.unwrap_or_default(),
        },
    };

    let cluster = ClusterConfig::new(ClusterConfigInput {
        name: args.name,
        host: args.host,
        port: args.port,
        database: args.database,
        cluster_type: args.cluster_type,
        region: args.region,
        credential,
    })?;
    let saved = services.clusters.save_cluster(cluster).await?;
    println!("Saved cluster '{}' ({})", saved.name(), saved.display_name());
    Ok(true)
}

async fn scan(services: &Services, args: ScanArgs) -> AppResult<bool> {
    if args.all {
        let summary = services.scans.scan_all().await?;
        if !args.quiet {
            for result in &summary.results {
                print_scan_result(result);
            }
        }
        println!(
            "Scanned {} clusters: {} succeeded, {} failed",
            summary.results.len(),
            summary.succeeded,
            summary.failed
        );
        return Ok(summary.all_succeeded());
    }

    let Some(name) = args.cluster else {
        return Err(AppError::Validation(
            "either --cluster or --all is required".to_owned(),
        ));
    };
    let cluster = services.clusters.find_cluster_by_name(&name).await?;
    let result = services.scans.scan(&cluster).await;
    if args.quiet {
        println!("{}", result.message);
    } else {
        print_scan_result(&result);
    }
    Ok(result.success)
}

fn print_scan_result(result: &ScanResult) {
    let phase = result
        .failed_phase
        .map(|phase| format!(" during {phase}"))
        .unwrap_or_default();
    println!(
        "[{}] {}{} ({} ms, {} role grants)",
        result.cluster_name,
        result.message,
        phase,
        result.duration.as_millis(),
        result.lineage.len()
    );
}

async fn show_permissions(services: &Services, args: PermissionsArgs) -> AppResult<bool> {
    let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
    let result = services
        .scans
        .export_cached_permissions(cluster_id(&cluster)?, args.filter.as_deref())
        .await?;
    output::emit(&result, args.format, None)?;
    Ok(true)
}

async fn export(services: &Services, args: ExportArgs) -> AppResult<bool> {
    let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
    let result = services
        .scans
        .export_cached_permissions(cluster_id(&cluster)?, args.filter.as_deref())
        .await?;
    output::emit(&result, OutputFormat::Csv, Some(args.output.as_path()))?;
    println!(
        "Exported {} permissions to {}",
        result.row_count(),
        args.output.display()
    );
    Ok(true)
}

async fn templates(services: &Services, args: TemplatesArgs) -> AppResult<bool> {
    let templates = match args.category.as_deref() {
        Some(category) => services.library.templates_in_category(category).await?,
        None => services.library.list_templates().await?,
    };

    let mut result = TabularResult::new(
        ["Id", "Category", "Name", "Parameters", "Built In", "Description"]
            .into_iter()
            .map(|name| TabularColumn::new(name, "text"))
            .collect(),
    );
    for template in &templates {
        result.push_row(vec![
            template.id().map_or(SqlValue::Null, SqlValue::Int),
            SqlValue::from(template.category()),
            SqlValue::from(template.name()),
            SqlValue::from(template.parameter_names().join(", ")),
            SqlValue::Bool(template.is_built_in()),
            template
                .description()
                .map_or(SqlValue::Null, SqlValue::from),
        ])?;
    }

    println!("{}", output::render_table(&result));
    Ok(true)
}

async fn query(services: &Services, args: QueryArgs) -> AppResult<bool> {
    let cluster = services.clusters.find_cluster_by_name(&args.cluster).await?;
    let parameters = parse_parameters(&args.params)?;

    let result = match (args.template, args.sql, args.file) {
        (Some(template_id), _, _) => {
            let template = services.library.find_template(template_id).await?;
            if args.explain {
                services
                    .queries
                    .explain(&cluster, template.sql(), &parameters)
                    .await?
            } else {
                services
                    .queries
                    .execute_template(&cluster, &template, &parameters)
                    .await?
            }
        }
        (None, sql, file) => {
            let sql = read_statement(sql, file.as_deref())?;
            for warning in services.queries.validate(&sql).warnings {
                eprintln!("warning: {warning}");
            }
            if args.explain {
                services.queries.explain(&cluster, &sql, &parameters).await?
            } else {
                services.queries.execute(&cluster, &sql, &parameters).await?
            }
        }
    };

    info!(rows = result.row_count(), "query finished");
    output::emit(&result, args.format, args.output.as_deref())?;
    Ok(true)
}

fn read_statement(sql: Option<String>, file: Option<&Path>) -> AppResult<String> {
    match (sql, file) {
        (Some(sql), _) => Ok(sql),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|error| {
            AppError::Validation(format!("failed to read '{}': {error}", path.display()))
        }),
        (None, None) => Err(AppError::Validation(
            "one of --sql, --file or --template is required".to_owned(),
        )),
    }
}

/// Parses `name=value` pairs. Integers and decimals bind as numbers, anything else as text.
pub fn parse_parameters(pairs: &[String]) -> AppResult<NamedParameters> {
    let mut parameters = NamedParameters::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(AppError::Validation(format!(
                "parameter '{pair}' must look like name=value"
            )));
        };
        let name = name.trim().trim_start_matches(':');
        if name.is_empty() {
            return Err(AppError::Validation(format!(
                "parameter '{pair}' has no name"
            )));
        }

        let value = if let Ok(integer) = value.parse::<i64>() {
            SqlValue::Int(integer)
        } else if let Ok(float) = value.parse::<f64>() {
            SqlValue::Float(float)
        } else {
            SqlValue::from(value)
        };
        parameters.insert(name.to_owned(), value);
    }

    Ok(parameters)
}

fn grant_request(args: GrantArgs) -> AppResult<PermissionRequest> {
    let GrantArgs {
        grantee,
        schema,
        table,
        on,
        permissions,
        with_grant_option,
        owner,
        ..
    } = args;

    Ok(match on {
        GrantTarget::Table => PermissionRequest::GrantTable {
            schema,
            table: table.ok_or_else(|| {
                AppError::Validation("--table is required for table grants".to_owned())
            })?,
            grantee,
            permissions,
            with_grant_option,
        },
        GrantTarget::Schema => PermissionRequest::GrantSchema {
            schema,
            grantee,
            permissions,
            with_grant_option,
        },
        GrantTarget::AllTables => PermissionRequest::GrantAllTablesInSchema {
            schema,
            grantee,
            permissions,
            with_grant_option,
        },
        GrantTarget::Defaults => PermissionRequest::AlterDefaultPrivileges {
            schema,
            grantee,
            permissions,
            owner,
        },
    })
}

fn revoke_request(args: RevokeArgs) -> PermissionRequest {
    let RevokeArgs {
        grantee,
        schema,
        table,
        permissions,
        all,
        cascade,
        ..
    } = args;

    match (table, all) {
        (Some(table), true) => PermissionRequest::RevokeAll {
            schema,
            table,
            grantee,
            cascade,
        },
        (Some(table), false) => PermissionRequest::RevokeTable {
            schema,
            table,
            grantee,
            permissions,
            cascade,
        },
        (None, _) => PermissionRequest::RevokeSchema {
            schema,
            grantee,
            permissions,
            cascade,
        },
    }
}

fn create_user_request(args: CreateUserArgs) -> PermissionRequest {
    PermissionRequest::CreateUser(CreateUserRequest {
        username: args.username,
        password: args.password,
        connection_limit: args.connection_limit,
        valid_until: args.valid_until,
        create_db: args.create_db,
        create_user: args.create_user,
    })
}

async fn apply(services: &Services, cluster: &ClusterConfig, request: &PermissionRequest) -> bool {
    let result = services.permissions.apply(cluster, request).await;

    if services.permissions.is_read_only() && result.error.is_none() && !result.success {
        println!("Read-only mode: statement not executed. Re-run with --allow-writes to apply.");
    } else {
        println!("{}", result.message);
    }
    if let Some(sql) = &result.sql {
        println!("{sql}");
    }

    result.success
}

#[cfg(test)]
mod tests {
    use guardian_application::{PermissionRequest, SqlValue};
    use guardian_core::AppError;

    use super::{parse_parameters, revoke_request};
    use crate::cli_args::RevokeArgs;

    #[test]
    fn parameters_bind_numbers_and_text() {
        let parsed = parse_parameters(&[
            "username=alice".to_owned(),
            ":limit=10".to_owned(),
            "ratio=0.5".to_owned(),
            "note=a=b".to_owned(),
        ]);
        let Ok(parameters) = parsed else {
            panic!("parameters should parse");
        };
        assert_eq!(parameters.get("username"), Some(&SqlValue::from("alice")));
        assert_eq!(parameters.get("limit"), Some(&SqlValue::Int(10)));
        assert_eq!(parameters.get("ratio"), Some(&SqlValue::Float(0.5)));
        assert_eq!(parameters.get("note"), Some(&SqlValue::from("a=b")));
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        assert!(matches!(
            parse_parameters(&["novalue".to_owned()]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_parameters(&["=1".to_owned()]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn revoke_without_table_targets_the_schema() {
        let request = revoke_request(RevokeArgs {
            cluster: "main".to_owned(),
            grantee: "alice".to_owned(),
            schema: "sales".to_owned(),
            table: None,
            permissions: vec!["USAGE".to_owned()],
            all: false,
            cascade: false,
        });
        assert!(matches!(request, PermissionRequest::RevokeSchema { .. }));
    }
}
