use std::borrow::Cow;
use std::io::Write;

use guardian_core::{AppError, AppResult};

use crate::tabular::TabularResult;

/// Writes a header row and one line per row, quoting fields that need it.
///
/// A field is quoted when it contains the delimiter, a double quote or a line
/// break; embedded quotes are doubled. `NULL` is written as an empty field.
pub fn write_delimited<W: Write>(
    result: &TabularResult,
    writer: &mut W,
    delimiter: char,
) -> AppResult<()> {
    let header: Vec<Cow<'_, str>> = result
        .columns()
        .iter()
        .map(|column| escape_field(column.name.as_str(), delimiter))
        .collect();
    write_record(writer, &header, delimiter)?;

    for row in result.rows() {
        let rendered: Vec<String> = row.iter().map(ToString::to_string).collect();
        let fields: Vec<Cow<'_, str>> = rendered
            .iter()
            .map(|value| escape_field(value.as_str(), delimiter))
            .collect();
        write_record(writer, &fields, delimiter)?;
    }

    writer
        .flush()
        .map_err(|error| AppError::Internal(format!("failed to flush export: {error}")))
}

/// Renders a result as comma separated text.
pub fn to_csv_string(result: &TabularResult) -> AppResult<String> {
    let mut buffer = Vec::new();
    write_delimited(result, &mut buffer, ',')?;
    String::from_utf8(buffer)
        .map_err(|error| AppError::Internal(format!("export produced invalid UTF-8: {error}")))
}

fn write_record<W: Write>(
    writer: &mut W,
    fields: &[Cow<'_, str>],
    delimiter: char,
) -> AppResult<()> {
    let mut separator = [0_u8; 4];
    let separator = delimiter.encode_utf8(&mut separator);

    let line = fields.join(&*separator);
    writer
        .write_all(line.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .map_err(|error| AppError::Internal(format!("failed to write export: {error}")))
}

fn escape_field(value: &str, delimiter: char) -> Cow<'_, str> {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{to_csv_string, write_delimited};
    use crate::tabular::{SqlValue, TabularColumn, TabularResult};

    /// Splits CSV text into records, honouring quoted fields.
    fn split_records(text: &str) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = text.chars().peekable();

        while let Some(character) = chars.next() {
            match (quoted, character) {
                (true, '"') if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                (true, '"') => quoted = false,
                (true, other) => field.push(other),
                (false, '"') => quoted = true,
                (false, ',') => record.push(std::mem::take(&mut field)),
                (false, '\n') => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                (false, other) => field.push(other),
            }
        }

        records
    }

    fn sample() -> TabularResult {
        let mut result = TabularResult::new(vec![
            TabularColumn::new("name", "TEXT"),
            TabularColumn::new("note", "TEXT"),
            TabularColumn::new("count", "INT8"),
        ]);
        assert!(
            result
                .push_row(vec![
                    SqlValue::from("plain"),
                    SqlValue::from("a,b \"quoted\"\nnext line"),
                    SqlValue::Int(3),
                ])
                .is_ok()
        );
        assert!(
            result
                .push_row(vec![SqlValue::from("empty"), SqlValue::Null, SqlValue::Int(0)])
                .is_ok()
        );
        result
    }

    #[test]
    fn awkward_field_is_quoted_with_doubled_quotes() {
        let csv = to_csv_string(&sample()).ok();
        assert_eq!(
            csv.as_deref(),
            Some(
                "name,note,count\nplain,\"a,b \"\"quoted\"\"\nnext line\",3\nempty,,0\n"
            )
        );
    }

    #[test]
    fn resplitting_recovers_original_values() {
        let Ok(csv) = to_csv_string(&sample()) else {
            panic!("export failed");
        };
        let records = split_records(csv.as_str());
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][1], "a,b \"quoted\"\nnext line");
        assert_eq!(records[2], vec!["empty".to_owned(), String::new(), "0".to_owned()]);
    }

    #[test]
    fn custom_delimiter_only_quotes_on_that_delimiter() {
        let mut buffer = Vec::new();
        assert!(write_delimited(&sample(), &mut buffer, '\t').is_ok());
        let text = String::from_utf8(buffer).unwrap_or_default();
        assert!(text.starts_with("name\tnote\tcount\n"));
        assert!(text.contains("\"a,b \"\"quoted\"\"\nnext line\""));
    }
}
