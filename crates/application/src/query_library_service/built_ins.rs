use guardian_core::AppResult;
use guardian_domain::{QueryTemplate, QueryTemplateInput};

struct BuiltIn {
    name: &'static str,
    category: &'static str,
    description: &'static str,
    sql: &'static str,
    parameters: &'static [&'static str],
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        name: "All Users",
        category: "Users",
        description: "All database users with their attributes",
        sql: "SELECT usename, usesysid, usesuper, usecreatedb, valuntil FROM pg_user ORDER BY usename",
        parameters: &[],
    },
    BuiltIn {
        name: "Last Login (Provisioned)",
        category: "Users",
        description: "Last successful login per user on provisioned clusters",
        sql: r#"SELECT username, MAX(recordtime) AS last_login
FROM stl_connection_log
WHERE event = 'authenticated'
GROUP BY username
ORDER BY last_login DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Last Login (Serverless)",
        category: "Users",
        description: "Last successful login per user on serverless workgroups",
        sql: r#"SELECT user_name, MAX(start_time) AS last_login
FROM sys_connection_log
WHERE action = 'connect'
GROUP BY user_name
ORDER BY last_login DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Unused Users",
        category: "Users",
        description: "Users without a login in the last 90 days",
        sql: r#"SELECT u.usename, u.usesysid, u.usesuper, MAX(c.recordtime) AS last_login
FROM pg_user u
LEFT JOIN stl_connection_log c ON u.usename = c.username AND c.event = 'authenticated'
GROUP BY u.usename, u.usesysid, u.usesuper
HAVING MAX(c.recordtime) < DATEADD(day, -90, GETDATE()) OR MAX(c.recordtime) IS NULL
ORDER BY last_login"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Superusers",
        category: "Users",
        description: "Superusers with their latest login",
        sql: r#"SELECT u.usename, u.usesysid, u.usecreatedb, MAX(c.recordtime) AS last_login
FROM pg_user u
LEFT JOIN stl_connection_log c ON u.usename = c.username AND c.event = 'authenticated'
WHERE u.usesuper = true
GROUP BY u.usename, u.usesysid, u.usecreatedb
ORDER BY last_login DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "All Roles",
        category: "Roles",
        description: "Roles and their owners",
        sql: "SELECT role_name, role_owner FROM svv_roles ORDER BY role_name",
        parameters: &[],
    },
    BuiltIn {
        name: "Role Lineage",
        category: "Roles",
        description: "Role inheritance tree, ten levels deep",
        sql: r#"WITH RECURSIVE role_hierarchy (member_name, member_type, parent_role, depth) AS (
    SELECT member_name, member_type, role_name, 1
    FROM svv_role_grants
    UNION ALL
    SELECT rh.member_name, rh.member_type, rg.role_name, rh.depth + 1
    FROM role_hierarchy rh
    JOIN svv_role_grants rg ON rh.parent_role = rg.member_name
    WHERE rh.depth < 10
)
SELECT member_name, member_type, parent_role, depth
FROM role_hierarchy
ORDER BY depth, member_name"#,
        parameters: &[],
    },
    BuiltIn {
        name: "All Table Permissions",
        category: "Permissions",
        description: "Table-level grants",
        sql: r#"SELECT grantor, grantee, table_schema, table_name, privilege_type, is_grantable
FROM information_schema.table_privileges
ORDER BY grantee, table_schema, table_name"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Table Permissions for User",
        category: "Permissions",
        description: "Table-level grants held directly by one user",
        sql: r#"SELECT table_schema, table_name, privilege_type, is_grantable
FROM information_schema.table_privileges
WHERE grantee = :username
ORDER BY table_schema, table_name, privilege_type"#,
        parameters: &["username"],
    },
    BuiltIn {
        name: "Schema Permissions",
        category: "Permissions",
        description: "Schemas each user can use or create objects in",
        sql: r#"SELECT n.nspname AS schema_name,
       u.usename,
       has_schema_privilege(u.usename, n.nspname, 'USAGE') AS can_use,
       has_schema_privilege(u.usename, n.nspname, 'CREATE') AS can_create
FROM pg_namespace n
CROSS JOIN pg_user u
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
ORDER BY schema_name, u.usename"#,
        parameters: &[],
    },
    BuiltIn {
        name: "All Tables and Views",
        category: "Tables",
        description: "Tables and views outside the system schemas",
        sql: r#"SELECT table_schema, table_name, table_type
FROM information_schema.tables
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY table_schema, table_name"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Columns for Specific Table",
        category: "Tables",
        description: "Columns of one table",
        sql: r#"SELECT table_schema, column_name, data_type, is_nullable, column_default
FROM information_schema.columns
WHERE table_name = :table_name
ORDER BY table_schema, ordinal_position"#,
        parameters: &["table_name"],
    },
    BuiltIn {
        name: "Orphaned Permissions",
        category: "Audit",
        description: "Grants held by names that are neither users nor roles",
        sql: r#"SELECT tp.grantee, COUNT(*) AS permission_count
FROM information_schema.table_privileges tp
WHERE tp.grantee NOT IN (SELECT usename FROM pg_user)
  AND tp.grantee NOT IN (SELECT role_name FROM svv_roles)
GROUP BY tp.grantee
ORDER BY permission_count DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Permission Explosion Detection",
        category: "Audit",
        description: "Grantees holding more than 100 table privileges",
        sql: r#"SELECT grantee,
       COUNT(DISTINCT table_schema) AS schema_count,
       COUNT(DISTINCT table_name) AS table_count,
       COUNT(*) AS total_permissions
FROM information_schema.table_privileges
GROUP BY grantee
HAVING COUNT(*) > 100
ORDER BY total_permissions DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Active Queries",
        category: "Activity",
        description: "Statements currently running, by user",
        sql: r#"SELECT userid, query, starttime, SUBSTRING(text, 1, 100) AS query_text
FROM stv_inflight
ORDER BY starttime DESC"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Query History (Provisioned)",
        category: "Activity",
        description: "Latest 100 user statements on provisioned clusters",
        sql: r#"SELECT userid, query, starttime, endtime, aborted, SUBSTRING(querytxt, 1, 100) AS query_text
FROM stl_query
WHERE userid > 1
ORDER BY starttime DESC
LIMIT 100"#,
        parameters: &[],
    },
    BuiltIn {
        name: "Query History (Serverless)",
        category: "Activity",
        description: "Latest 100 user statements on serverless workgroups",
        sql: r#"SELECT user_id, query_id, start_time, end_time, status, query_text
FROM sys_query_history
ORDER BY start_time DESC
LIMIT 100"#,
        parameters: &[],
    },
];

/// Builds the templates shipped with the tool.
pub(super) fn built_in_templates() -> AppResult<Vec<QueryTemplate>> {
    BUILT_INS
        .iter()
        .map(|built_in| {
            QueryTemplate::new(QueryTemplateInput {
                name: built_in.name.to_owned(),
                category: built_in.category.to_owned(),
                description: Some(built_in.description.to_owned()),
                sql: built_in.sql.to_owned(),
                parameter_names: built_in
                    .parameters
                    .iter()
                    .map(|name| (*name).to_owned())
                    .collect(),
            })
            .map(QueryTemplate::built_in)
        })
        .collect()
}
