//! Generic row/column result shared by grid, CSV and JSON destinations.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use guardian_core::{AppError, AppResult};
use serde_json::{Map, Number, Value};

/// Single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Any integer width.
    Int(i64),
    /// Any floating point width.
    Float(f64),
    /// Character data, and any value the driver rendered as text.
    Text(String),
    /// Timestamp normalized to UTC.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Returns whether the value is `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns text content, if the value is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns an integer, if the value is integral.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a boolean, if the value is boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a timestamp, if the value is a timestamp.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts the value into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(value) => Value::String(value.clone()),
            Self::Timestamp(value) => Value::String(value.to_rfc3339()),
        }
    }
}

impl Display for SqlValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value}"),
            Self::Text(value) => formatter.write_str(value),
            Self::Timestamp(value) => write!(formatter, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Column metadata of a tabular result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularColumn {
    /// Column label as returned by the server.
    pub name: String,
    /// Server-side type name.
    pub type_name: String,
}

impl TabularColumn {
    /// Creates column metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Ordered columns plus rows of cell values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularResult {
    columns: Vec<TabularColumn>,
    rows: Vec<Vec<SqlValue>>,
}

impl TabularResult {
    /// Creates an empty result with the given columns.
    #[must_use]
    pub fn new(columns: Vec<TabularColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row. The row must have one value per column.
    pub fn push_row(&mut self, row: Vec<SqlValue>) -> AppResult<()> {
        if row.len() != self.columns.len() {
            return Err(AppError::Internal(format!(
                "row has {} values but result has {} columns",
                row.len(),
                self.columns.len()
            )));
        }

        self.rows.push(row);
        Ok(())
    }

    /// Returns column metadata.
    #[must_use]
    pub fn columns(&self) -> &[TabularColumn] {
        &self.columns
    }

    /// Returns all rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of a column, compared case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Returns the value in the first column of the first row.
    #[must_use]
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Returns a row accessor that resolves cells by column name.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        self.rows.get(index).map(|values| RowView {
            result: self,
            values,
        })
    }

    /// Iterates rows as name-addressable views.
    pub fn iter_rows(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |values| RowView {
            result: self,
            values,
        })
    }

    /// Renders the rows as a JSON array of objects keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let mut object = Map::with_capacity(self.columns.len());
                    for (column, value) in self.columns.iter().zip(row) {
                        object.insert(column.name.clone(), value.to_json());
                    }
                    Value::Object(object)
                })
                .collect(),
        )
    }
}

/// Borrowed view over one row of a [`TabularResult`].
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    result: &'a TabularResult,
    values: &'a [SqlValue],
}

impl RowView<'_> {
    /// Returns a cell by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.result
            .column_index(column)
            .and_then(|index| self.values.get(index))
    }

    /// Returns a required text cell.
    pub fn text(&self, column: &str) -> AppResult<String> {
        match self.get(column) {
            Some(SqlValue::Text(value)) => Ok(value.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(missing_column(column, "text")),
        }
    }

    /// Returns a required integer cell.
    pub fn int(&self, column: &str) -> AppResult<i64> {
        match self.get(column) {
            Some(SqlValue::Int(value)) => Ok(*value),
            Some(SqlValue::Text(value)) => value
                .trim()
                .parse::<i64>()
                .map_err(|_| missing_column(column, "integer")),
            _ => Err(missing_column(column, "integer")),
        }
    }

    /// Returns a required boolean cell.
    pub fn bool(&self, column: &str) -> AppResult<bool> {
        match self.get(column) {
            Some(SqlValue::Bool(value)) => Ok(*value),
            Some(SqlValue::Int(value)) => Ok(*value != 0),
            Some(SqlValue::Text(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" => Ok(true),
                "f" | "false" | "0" => Ok(false),
                _ => Err(missing_column(column, "boolean")),
            },
            _ => Err(missing_column(column, "boolean")),
        }
    }

    /// Returns an optional timestamp cell.
    pub fn optional_timestamp(&self, column: &str) -> AppResult<Option<DateTime<Utc>>> {
        match self.get(column) {
            Some(SqlValue::Timestamp(value)) => Ok(Some(*value)),
            Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(value)) if value.eq_ignore_ascii_case("infinity") => Ok(None),
            _ => Err(missing_column(column, "timestamp")),
        }
    }
}

fn missing_column(column: &str, expected: &str) -> AppError {
    AppError::Internal(format!(
        "result column '{column}' is missing or is not a {expected}"
    ))
}
