//! Shared primitives for all Rust crates in Guardian.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Guardian crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Cluster identifier used as the partition key for every cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(i64);

impl ClusterId {
    /// Creates a cluster identifier from a stored row id.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying row id.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for ClusterId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation exceeded its time budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Remote cluster rejected a statement or dropped the connection.
    #[error("remote error: {message}{}", sql_state_suffix(.sql_state))]
    Remote {
        /// Driver-level error message.
        message: String,
        /// Protocol SQLSTATE when the server reported one.
        sql_state: Option<String>,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn sql_state_suffix(sql_state: &Option<String>) -> String {
    sql_state
        .as_deref()
        .map(|code| format!(" (SQL state: {code})"))
        .unwrap_or_default()
}

impl AppError {
    /// Returns the protocol SQLSTATE attached to a remote failure.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Remote { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}
