use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};

use guardian_application::{TabularResult, write_delimited};
use guardian_core::{AppError, AppResult};

/// Rendering of a tabular result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text grid.
    Table,
    /// Comma-separated values with a header row.
    Csv,
    /// JSON array of objects.
    Json,
}

pub fn render(result: &TabularResult, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Table => Ok(render_table(result)),
        OutputFormat::Csv => guardian_application::to_csv_string(result),
        OutputFormat::Json => serde_json::to_string_pretty(&result.to_json())
            .map_err(|error| AppError::Internal(format!("failed to render json: {error}"))),
    }
}

pub fn render_table(result: &TabularResult) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(result.columns().iter().map(|column| Cell::new(&column.name)));
    for row in result.rows() {
        table.add_row(row.iter().map(Cell::new));
    }

    let noun = if result.row_count() == 1 { "row" } else { "rows" };
    format!("{table}\n({} {noun})", result.row_count())
}

/// Writes the result to a file, or to stdout when no path is given.
pub fn emit(result: &TabularResult, format: OutputFormat, path: Option<&Path>) -> AppResult<()> {
    match path {
        Some(path) if format == OutputFormat::Csv => {
            let file = File::create(path).map_err(|error| file_error(path, error))?;
            let mut writer = BufWriter::new(file);
            write_delimited(result, &mut writer, ',')?;
            writer.flush().map_err(|error| file_error(path, error))
        }
        Some(path) => {
            let rendered = render(result, format)?;
            std::fs::write(path, rendered).map_err(|error| file_error(path, error))
        }
        None => {
            println!("{}", render(result, format)?);
            Ok(())
        }
    }
}

fn file_error(path: &Path, error: std::io::Error) -> AppError {
    AppError::Internal(format!("failed to write '{}': {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use guardian_application::{SqlValue, TabularColumn, TabularResult};

    use super::{OutputFormat, render};

    fn result() -> TabularResult {
        let mut result = TabularResult::new(vec![
            TabularColumn::new("usename", "NAME"),
            TabularColumn::new("usesuper", "BOOL"),
        ]);
        assert!(
            result
                .push_row(vec![SqlValue::from("alice"), SqlValue::from(true)])
                .is_ok()
        );
        result
    }

    #[test]
    fn table_output_lists_headers_and_row_count() {
        let rendered = render(&result(), OutputFormat::Table).unwrap_or_default();
        assert!(rendered.contains("usename"));
        assert!(rendered.contains("alice"));
        assert!(rendered.ends_with("(1 row)"));
    }

    #[test]
    fn json_output_is_an_array_of_objects() {
        let rendered = render(&result(), OutputFormat::Json).unwrap_or_default();
        let parsed: serde_json::Value = serde_json::from_str(rendered.as_str()).unwrap_or_default();
        assert_eq!(parsed[0]["usename"], "alice");
        assert_eq!(parsed[0]["usesuper"], true);
    }
}
