use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use guardian_domain::{ClusterType, DEFAULT_CLUSTER_PORT};

use crate::output::OutputFormat;

/// Audit and manage access control on Redshift clusters.
#[derive(Debug, Parser)]
#[command(name = "guardian", version)]
pub struct Cli {
    /// Execute mutations even when read-only mode is configured.
    #[arg(long, global = true)]
    pub allow_writes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured clusters.
    List,
    /// Add a cluster configuration.
    Add(AddClusterArgs),
    /// Remove a cluster and its cached snapshot.
    Remove(ClusterArg),
    /// Open a connection and run a round-trip query.
    Test(ClusterArg),
    /// Refresh the cached users and permissions snapshot.
    Scan(ScanArgs),
    /// Show cached users.
    Users(ClusterArg),
    /// Show cached table permissions.
    Permissions(PermissionsArgs),
    /// Run an ad-hoc query or a saved template.
    Query(QueryArgs),
    /// Export cached permissions to CSV.
    Export(ExportArgs),
    /// List saved query templates.
    Templates(TemplatesArgs),
    /// Grant privileges.
    Grant(GrantArgs),
    /// Revoke privileges.
    Revoke(RevokeArgs),
    /// Create a database user.
    CreateUser(CreateUserArgs),
    /// Change a user's password.
    SetPassword(SetPasswordArgs),
    /// Drop a database user.
    DropUser(UserArg),
    /// Create a group.
    CreateGroup(GroupArg),
    /// Drop a group.
    DropGroup(GroupArg),
    /// Add a user to a group.
    AddMember(MembershipArgs),
    /// Remove a user from a group.
    RemoveMember(MembershipArgs),
}

#[derive(Debug, Args)]
pub struct ClusterArg {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
}

#[derive(Debug, Args)]
pub struct AddClusterArgs {
    /// Unique cluster name.
    #[arg(long)]
    pub name: String,
    /// Endpoint host.
    #[arg(long)]
    pub host: String,
    /// Endpoint port.
    #[arg(long, default_value_t = DEFAULT_CLUSTER_PORT)]
    pub port: u16,
    /// Database to connect to.
    #[arg(long, default_value = "dev")]
    pub database: String,
    /// Provisioned or Serverless.
    #[arg(long = "type", default_value = "provisioned")]
    pub cluster_type: ClusterType,
    /// Cluster region.
    #[arg(long, default_value = "us-east-1")]
    pub region: String,
    /// Credential profile for IAM-style authentication.
    #[arg(long, conflicts_with = "username")]
    pub profile: Option<String>,
    /// Database user for password authentication.
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Cluster name.
    #[arg(short, long, required_unless_present = "all", conflicts_with = "all")]
    pub cluster: Option<String>,
    /// Scan every configured cluster.
    #[arg(long)]
    pub all: bool,
    /// Print only the summary line.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct PermissionsArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Case-insensitive substring over user, schema, table and privilege.
    #[arg(long)]
    pub filter: Option<String>,
    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Statement text.
    #[arg(long, conflicts_with_all = ["file", "template"])]
    pub sql: Option<String>,
    /// File holding the statement.
    #[arg(long, conflicts_with = "template")]
    pub file: Option<PathBuf>,
    /// Saved template id.
    #[arg(long)]
    pub template: Option<i64>,
    /// Named parameter as `name=value`, repeatable.
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
    /// Write the result to a file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Show the execution plan instead of running the statement.
    #[arg(long)]
    pub explain: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Destination CSV file.
    #[arg(short, long)]
    pub output: PathBuf,
    /// Case-insensitive substring over user, schema, table and privilege.
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Only show one category.
    #[arg(long)]
    pub category: Option<String>,
}

/// Object a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrantTarget {
    /// One table, requires `--table`.
    Table,
    /// The schema itself.
    Schema,
    /// Every existing table in the schema.
    AllTables,
    /// Tables created in the schema from now on.
    Defaults,
}

#[derive(Debug, Args)]
pub struct GrantArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Receiving user.
    #[arg(long)]
    pub grantee: String,
    /// Schema name.
    #[arg(long)]
    pub schema: String,
    /// Table name.
    #[arg(long)]
    pub table: Option<String>,
    /// What the privileges apply to.
    #[arg(long, value_enum, default_value = "table")]
    pub on: GrantTarget,
    /// Privileges, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    pub permissions: Vec<String>,
    /// Allow the grantee to grant onwards.
    #[arg(long)]
    pub with_grant_option: bool,
    /// Owner whose future tables are covered by `--on defaults`.
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// User losing the privileges.
    #[arg(long)]
    pub grantee: String,
    /// Schema name.
    #[arg(long)]
    pub schema: String,
    /// Table name. Omit to revoke schema privileges.
    #[arg(long)]
    pub table: Option<String>,
    /// Privileges, comma separated.
    #[arg(long, value_delimiter = ',', required_unless_present = "all")]
    pub permissions: Vec<String>,
    /// Revoke every privilege on the table.
    #[arg(long, requires = "table", conflicts_with = "permissions")]
    pub all: bool,
    /// Also revoke grants made onwards by the grantee.
    #[arg(long)]
    pub cascade: bool,
}

#[derive(Debug, Args)]
pub struct CreateUserArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Login name.
    #[arg(long)]
    pub username: String,
    /// Initial password.
    #[arg(long, env = "GUARDIAN_NEW_USER_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Maximum concurrent connections.
    #[arg(long)]
    pub connection_limit: Option<u32>,
    /// Password expiry as an RFC 3339 timestamp.
    #[arg(long)]
    pub valid_until: Option<DateTime<Utc>>,
    /// Allow creating databases.
    #[arg(long)]
    pub create_db: bool,
    /// Allow creating users.
    #[arg(long)]
    pub create_user: bool,
}

#[derive(Debug, Args)]
pub struct SetPasswordArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Login name.
    #[arg(long)]
    pub username: String,
    /// New password.
    #[arg(long, env = "GUARDIAN_NEW_USER_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct UserArg {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Login name.
    #[arg(long)]
    pub username: String,
}

#[derive(Debug, Args)]
pub struct GroupArg {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Group name.
    #[arg(long)]
    pub group: String,
}

#[derive(Debug, Args)]
pub struct MembershipArgs {
    /// Cluster name.
    #[arg(short, long)]
    pub cluster: String,
    /// Group name.
    #[arg(long)]
    pub group: String,
    /// Member login name.
    #[arg(long)]
    pub username: String,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command, GrantTarget};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_requires_a_cluster_or_all() {
        assert!(Cli::try_parse_from(["guardian", "scan"]).is_err());
        assert!(Cli::try_parse_from(["guardian", "scan", "--all", "--cluster", "x"]).is_err());
        assert!(Cli::try_parse_from(["guardian", "scan", "--all"]).is_ok());
    }

    #[test]
    fn grant_splits_permission_lists() {
        let parsed = Cli::try_parse_from([
            "guardian",
            "--allow-writes",
            "grant",
            "--cluster",
            "main",
            "--grantee",
            "alice",
            "--schema",
            "sales",
            "--on",
            "all-tables",
            "--permissions",
            "select,insert",
        ]);
        let Ok(cli) = parsed else {
            panic!("grant should parse");
        };
        assert!(cli.allow_writes);
        let Command::Grant(grant) = cli.command else {
            panic!("expected grant");
        };
        assert_eq!(grant.on, GrantTarget::AllTables);
        assert_eq!(grant.permissions, vec!["select", "insert"]);
    }
}
