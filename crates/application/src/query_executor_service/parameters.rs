use std::collections::BTreeMap;

use guardian_core::{AppError, AppResult};

use crate::tabular::SqlValue;

/// Values for `:name` placeholders.
pub type NamedParameters = BTreeMap<String, SqlValue>;

/// Rewrites `:name` placeholders to positional `$n` and orders their values.
///
/// Placeholders inside quoted text, dollar-quoted bodies, `--` comments and
/// `/* */` comments are left alone, as are `::type` casts. Repeated names share
/// one position.
pub(crate) fn bind_named_parameters(
    sql: &str,
    values: &NamedParameters,
) -> AppResult<(String, Vec<SqlValue>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut rewritten = String::with_capacity(sql.len());
    let mut order: Vec<String> = Vec::new();
    let mut index = 0;

    while let Some(&current) = chars.get(index) {
        let next = chars.get(index + 1).copied();
        match current {
            '\'' | '"' => {
                rewritten.push(current);
                index += 1;
                while let Some(&quoted) = chars.get(index) {
                    rewritten.push(quoted);
                    index += 1;
                    if quoted == current {
                        if chars.get(index) == Some(&current) {
                            rewritten.push(current);
                            index += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if next == Some('-') => {
                while let Some(&commented) = chars.get(index) {
                    rewritten.push(commented);
                    index += 1;
                    if commented == '\n' {
                        break;
                    }
                }
            }
            '/' if next == Some('*') => {
                rewritten.push_str("/*");
                index += 2;
                let mut depth = 1;
                while depth > 0
                    && let Some(&commented) = chars.get(index)
                {
                    let following = chars.get(index + 1).copied();
                    if commented == '/' && following == Some('*') {
                        depth += 1;
                        rewritten.push_str("/*");
                        index += 2;
                    } else if commented == '*' && following == Some('/') {
                        depth -= 1;
                        rewritten.push_str("*/");
                        index += 2;
                    } else {
                        rewritten.push(commented);
                        index += 1;
                    }
                }
            }
            '$' => match dollar_tag(&chars, index) {
                Some(length) => {
                    let tag = &chars[index..index + length];
                    rewritten.extend(tag);
                    index += length;
                    while let Some(&quoted) = chars.get(index) {
                        if chars
                            .get(index..)
                            .is_some_and(|rest| rest.starts_with(tag))
                        {
                            rewritten.extend(tag);
                            index += length;
                            break;
                        }
                        rewritten.push(quoted);
                        index += 1;
                    }
                }
                None => {
                    rewritten.push(current);
                    index += 1;
                }
            },
            ':' if next == Some(':') => {
                rewritten.push_str("::");
                index += 2;
            }
            ':' if next.is_some_and(|c| c.is_ascii_alphabetic() || c == '_') => {
                let start = index + 1;
                let mut end = start;
                while chars
                    .get(end)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
                {
                    end += 1;
                }

                let name: String = chars[start..end].iter().collect();
                let position = match order.iter().position(|known| *known == name) {
                    Some(position) => position,
                    None => {
                        order.push(name);
                        order.len() - 1
                    }
                };
                rewritten.push('$');
                rewritten.push_str((position + 1).to_string().as_str());
                index = end;
            }
            _ => {
                rewritten.push(current);
                index += 1;
            }
        }
    }

    let bound = order
        .iter()
        .map(|name| {
            values.get(name).cloned().ok_or_else(|| {
                AppError::Validation(format!("no value supplied for parameter ':{name}'"))
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok((rewritten, bound))
}

/// Length of a `$tag$` opener at `start`, including both dollar signs.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    let mut end = start + 1;
    if chars
        .get(end)
        .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
    {
        while chars
            .get(end)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            end += 1;
        }
    }

    (chars.get(end) == Some(&'$')).then_some(end + 1 - start)
}

#[cfg(test)]
mod tests {
    use super::{NamedParameters, bind_named_parameters};
    use crate::tabular::SqlValue;

    fn parameters(pairs: &[(&str, SqlValue)]) -> NamedParameters {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn placeholders_become_positional_in_first_use_order() {
        let values = parameters(&[
            ("schema", SqlValue::from("sales")),
            ("user", SqlValue::from("alice")),
        ]);
        let bound = bind_named_parameters(
            "SELECT * FROM t WHERE u = :user AND s = :schema OR owner = :user",
            &values,
        );
        assert_eq!(
            bound.ok(),
            Some((
                "SELECT * FROM t WHERE u = $1 AND s = $2 OR owner = $1".to_owned(),
                vec![SqlValue::from("alice"), SqlValue::from("sales")]
            ))
        );
    }

    #[test]
    fn casts_quotes_and_comments_are_not_placeholders() {
        let sql = "SELECT '12:30'::time, \":odd\" -- :note\nFROM t WHERE id = :id";
        let bound = bind_named_parameters(sql, &parameters(&[("id", SqlValue::Int(4))]));
        assert_eq!(
            bound.ok(),
            Some((
                "SELECT '12:30'::time, \":odd\" -- :note\nFROM t WHERE id = $1".to_owned(),
                vec![SqlValue::Int(4)]
            ))
        );
    }

    #[test]
    fn block_comments_are_skipped_including_nested_ones() {
        let sql = "SELECT 1 /* ratio 1:ten /* inner :x */ still :y */ + :n";
        let bound = bind_named_parameters(sql, &parameters(&[("n", SqlValue::Int(2))]));
        assert_eq!(
            bound.ok(),
            Some((
                "SELECT 1 /* ratio 1:ten /* inner :x */ still :y */ + $1".to_owned(),
                vec![SqlValue::Int(2)]
            ))
        );
    }

    #[test]
    fn dollar_quoted_bodies_are_skipped() {
        let bound = bind_named_parameters("SELECT $$time is 10:x$$", &NamedParameters::new());
        assert_eq!(
            bound.ok().map(|(sql, _)| sql),
            Some("SELECT $$time is 10:x$$".to_owned())
        );

        let sql = "SELECT $fn$ a :b $$ :c $fn$, :d";
        let bound = bind_named_parameters(sql, &parameters(&[("d", SqlValue::from("v"))]));
        assert_eq!(
            bound.ok(),
            Some((
                "SELECT $fn$ a :b $$ :c $fn$, $1".to_owned(),
                vec![SqlValue::from("v")]
            ))
        );
    }

    #[test]
    fn positional_markers_are_not_dollar_quotes() {
        let bound = bind_named_parameters("SELECT $1 + 1", &NamedParameters::new());
        assert_eq!(
            bound.ok(),
            Some(("SELECT $1 + 1".to_owned(), Vec::new()))
        );
    }

    #[test]
    fn doubled_quotes_stay_inside_the_literal() {
        let sql = "SELECT 'it''s :not' , :yes";
        let bound = bind_named_parameters(sql, &parameters(&[("yes", SqlValue::Bool(true))]));
        assert_eq!(
            bound.ok().map(|(sql, _)| sql),
            Some("SELECT 'it''s :not' , $1".to_owned())
        );
    }

    #[test]
    fn missing_value_is_a_validation_error() {
        let error = bind_named_parameters("SELECT :missing", &NamedParameters::new())
            .err()
            .map(|error| error.to_string());
        assert_eq!(
            error.as_deref(),
            Some("validation error: no value supplied for parameter ':missing'")
        );
    }
}
