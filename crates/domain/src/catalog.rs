//! Normalized records extracted from a cluster's system catalog.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PermissionKind;

/// Schemas skipped by every catalog scan.
pub const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Database user as seen in the remote user catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Login name, unique within one snapshot.
    pub username: String,
    /// Numeric system id.
    pub user_id: i64,
    /// Superuser attribute.
    pub is_superuser: bool,
    /// May create databases.
    pub can_create_db: bool,
    /// May create users.
    pub can_create_user: bool,
    /// Password expiry, when set.
    pub valid_until: Option<DateTime<Utc>>,
}

impl Display for RemoteUser {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.username.as_str())
    }
}

/// One granted privilege of one user on one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePermission {
    /// Grantee login name.
    pub username: String,
    /// Schema holding the table.
    pub schema_name: String,
    /// Table name.
    pub table_name: String,
    /// Granted privilege.
    pub permission: PermissionKind,
}

impl TablePermission {
    /// Returns `schema.table`.
    #[must_use]
    pub fn qualified_table_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    /// Case-insensitive substring match over user, schema, table and privilege.
    #[must_use]
    pub fn matches_filter(&self, filter: &str) -> bool {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        [
            self.username.as_str(),
            self.schema_name.as_str(),
            self.table_name.as_str(),
            self.permission.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle.as_str()))
    }
}

impl Display for TablePermission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} on {}.{}: {}",
            self.username, self.schema_name, self.table_name, self.permission
        )
    }
}

/// Who granted a role membership, used for inheritance display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLineage {
    /// Member that received the role.
    pub granted_role: String,
    /// User that issued the grant.
    pub grantor: String,
    /// Member may grant the role onwards.
    pub admin_option: bool,
}

impl Display for RoleLineage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} granted by {}", self.granted_role, self.grantor)?;
        if self.admin_option {
            formatter.write_str(" (with admin)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RoleLineage, TablePermission};
    use crate::PermissionKind;

    fn permission() -> TablePermission {
        TablePermission {
            username: "etl_loader".to_owned(),
            schema_name: "sales".to_owned(),
            table_name: "Orders".to_owned(),
            permission: PermissionKind::Insert,
        }
    }

    #[test]
    fn qualified_name_joins_schema_and_table() {
        assert_eq!(permission().qualified_table_name(), "sales.Orders");
    }

    #[test]
    fn filter_matches_any_field_ignoring_case() {
        let permission = permission();
        assert!(permission.matches_filter("orders"));
        assert!(permission.matches_filter("LOADER"));
        assert!(permission.matches_filter("insert"));
        assert!(permission.matches_filter(""));
        assert!(!permission.matches_filter("finance"));
    }

    #[test]
    fn lineage_display_mentions_admin_option() {
        let lineage = RoleLineage {
            granted_role: "analyst".to_owned(),
            grantor: "admin".to_owned(),
            admin_option: true,
        };
        assert_eq!(lineage.to_string(), "analyst granted by admin (with admin)");
    }
}
