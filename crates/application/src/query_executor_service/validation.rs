use serde::Serialize;

/// Substrings that make a statement invalid, compared against upper-cased text.
const DENY_LIST: &[&str] = &[
    "DROP DATABASE",
    "DROP CLUSTER",
    "TRUNCATE ALL",
    "DELETE FROM PG_",
    "UPDATE PG_",
];

/// Advisory hazard report for an ad-hoc statement.
///
/// This is substring matching, not parsing. Comments and string literals are
/// not understood, so a valid report is not a safety guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryValidation {
    /// Whether the statement may be sent.
    pub is_valid: bool,
    /// Rejection reason when invalid.
    pub error_message: Option<String>,
    /// Non-blocking hazard notes.
    pub warnings: Vec<String>,
}

impl QueryValidation {
    fn rejected(message: String) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message),
            warnings: Vec::new(),
        }
    }
}

/// Checks a statement against the deny-list and collects warnings.
#[must_use]
pub fn validate_query(sql: &str) -> QueryValidation {
    if sql.trim().is_empty() {
        return QueryValidation::rejected("query cannot be empty".to_owned());
    }

    let upper = sql.trim().to_uppercase();

    if let Some(pattern) = DENY_LIST.iter().find(|pattern| upper.contains(*pattern)) {
        return QueryValidation::rejected(format!("dangerous command detected: {pattern}"));
    }

    let mut warnings = Vec::new();
    if upper.contains("SELECT *") && !upper.contains("LIMIT") {
        warnings.push("SELECT * without LIMIT can return large result sets".to_owned());
    }
    if (upper.contains("DELETE") || upper.contains("UPDATE")) && !upper.contains("WHERE") {
        warnings.push("DELETE/UPDATE without WHERE clause will affect all rows".to_owned());
    }
    if upper.contains("CROSS JOIN") {
        warnings.push("CROSS JOIN can produce very large result sets".to_owned());
    }

    QueryValidation {
        is_valid: true,
        error_message: None,
        warnings,
    }
}
