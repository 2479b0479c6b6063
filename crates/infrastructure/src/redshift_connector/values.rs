use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArguments, PgColumn, PgRow, PgValueFormat};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};

use guardian_application::{SqlValue, TabularColumn};
use guardian_core::{AppError, AppResult};

/// Binds one cell value as the next positional parameter.
pub(super) fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(value) => query.bind(*value),
        SqlValue::Int(value) => query.bind(*value),
        SqlValue::Float(value) => query.bind(*value),
        SqlValue::Text(value) => query.bind(value.clone()),
        SqlValue::Timestamp(value) => query.bind(*value),
    }
}

/// Converts driver column metadata.
pub(super) fn tabular_column(column: &PgColumn) -> TabularColumn {
    TabularColumn::new(column.name(), column.type_info().name())
}

/// Decodes every cell of a row.
pub(super) fn decode_row(row: &PgRow) -> AppResult<Vec<SqlValue>> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_error(index: usize, error: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("failed to decode column {index}: {error}"))
}

fn decode_cell(row: &PgRow, index: usize) -> AppResult<SqlValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|error| decode_error(index, error))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = raw.type_info().name().to_owned();
    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(get::<bool>(row, index)?),
        "INT2" => SqlValue::Int(i64::from(get::<i16>(row, index)?)),
        "INT4" => SqlValue::Int(i64::from(get::<i32>(row, index)?)),
        "INT8" => SqlValue::Int(get::<i64>(row, index)?),
        "OID" => SqlValue::Int(i64::from(get::<Oid>(row, index)?.0)),
        "FLOAT4" => SqlValue::Float(f64::from(get::<f32>(row, index)?)),
        "FLOAT8" => SqlValue::Float(get::<f64>(row, index)?),
        "NUMERIC" => SqlValue::Text(get::<Decimal>(row, index)?.to_string()),
        "TIMESTAMPTZ" => SqlValue::Timestamp(get::<DateTime<Utc>>(row, index)?),
        "TIMESTAMP" => SqlValue::Timestamp(get::<NaiveDateTime>(row, index)?.and_utc()),
        "DATE" => SqlValue::Text(get::<NaiveDate>(row, index)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            SqlValue::Text(get::<String>(row, index)?)
        }
        _ if matches!(raw.format(), PgValueFormat::Text) => SqlValue::Text(
            raw.as_str()
                .map_err(|error| decode_error(index, error))?
                .to_owned(),
        ),
        _ => SqlValue::Text(format!("<{type_name}>")),
    };

    Ok(value)
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> AppResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(index)
        .map_err(|error| decode_error(index, error))
}
