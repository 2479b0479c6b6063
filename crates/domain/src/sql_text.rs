//! Quoting rules for text embedded in generated SQL.

/// Placeholder written in place of secrets in audited statement text.
pub const MASKED_SECRET: &str = "***";

/// Wraps an identifier in double quotes, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Reverses [`quote_identifier`]. Returns `None` for malformed input.
#[must_use]
pub fn unquote_identifier(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(character) = chars.next() {
        if character == '"' {
            // A lone quote inside the body cannot come from quote_identifier.
            if chars.next() != Some('"') {
                return None;
            }
        }
        value.push(character);
    }

    Some(value)
}

/// Escapes a value for embedding between single quotes.
#[must_use]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Renders a single-quoted string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}
