use std::fmt::{Display, Formatter};
use std::str::FromStr;

use guardian_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Privilege keyword accepted in generated GRANT and REVOKE statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionKind {
    /// Read rows.
    Select,
    /// Add rows.
    Insert,
    /// Modify rows.
    Update,
    /// Remove rows.
    Delete,
    /// Create foreign-key references.
    References,
    /// Look up objects inside a schema.
    Usage,
    /// Create objects.
    Create,
    /// Create temporary tables.
    Temporary,
    /// Short form of `TEMPORARY`.
    Temp,
    /// Every privilege applicable to the object.
    All,
    /// Long form of `ALL`.
    AllPrivileges,
}

impl PermissionKind {
    /// Returns the SQL keyword for this privilege.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::References => "REFERENCES",
            Self::Usage => "USAGE",
            Self::Create => "CREATE",
            Self::Temporary => "TEMPORARY",
            Self::Temp => "TEMP",
            Self::All => "ALL",
            Self::AllPrivileges => "ALL PRIVILEGES",
        }
    }

    /// Returns every accepted privilege keyword.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[PermissionKind] = &[
            PermissionKind::Select,
            PermissionKind::Insert,
            PermissionKind::Update,
            PermissionKind::Delete,
            PermissionKind::References,
            PermissionKind::Usage,
            PermissionKind::Create,
            PermissionKind::Temporary,
            PermissionKind::Temp,
            PermissionKind::All,
            PermissionKind::AllPrivileges,
        ];

        ALL
    }

    /// Returns the table privileges probed during a catalog scan, in scan order.
    #[must_use]
    pub fn scanned() -> &'static [Self] {
        const SCANNED: &[PermissionKind] = &[
            PermissionKind::Select,
            PermissionKind::Insert,
            PermissionKind::Update,
            PermissionKind::Delete,
        ];

        SCANNED
    }

    /// Parses and validates a list of operator-supplied privilege names.
    ///
    /// Fails on the first unknown name and on an empty list.
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> AppResult<Vec<Self>> {
        if values.is_empty() {
            return Err(AppError::Validation(
                "at least one permission is required".to_owned(),
            ));
        }

        values
            .iter()
            .map(|value| value.as_ref().parse::<Self>())
            .collect()
    }

    /// Renders privileges as a comma separated SQL list.
    #[must_use]
    pub fn render_list(kinds: &[Self]) -> String {
        kinds
            .iter()
            .map(PermissionKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Display for PermissionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let upper = value.to_ascii_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| AppError::Validation(format!("invalid permission: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::PermissionKind;

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(
            "select".parse::<PermissionKind>().ok(),
            Some(PermissionKind::Select)
        );
        assert_eq!(
            "All Privileges".parse::<PermissionKind>().ok(),
            Some(PermissionKind::AllPrivileges)
        );
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let error = "DROP".parse::<PermissionKind>().err().map(|e| e.to_string());
        assert_eq!(
            error.as_deref(),
            Some("validation error: invalid permission: DROP")
        );
    }

    #[test]
    fn list_parsing_stops_at_first_unknown_value() {
        assert!(PermissionKind::parse_list(&["SELECT", "SELECT; DROP TABLE x"]).is_err());
        assert!(PermissionKind::parse_list::<&str>(&[]).is_err());
    }

    #[test]
    fn every_keyword_roundtrips() {
        for kind in PermissionKind::all() {
            assert_eq!(kind.as_str().parse::<PermissionKind>().ok(), Some(*kind));
        }
    }

    #[test]
    fn render_list_joins_keywords() {
        let rendered = PermissionKind::render_list(&[PermissionKind::Select, PermissionKind::Update]);
        assert_eq!(rendered, "SELECT, UPDATE");
    }
}
