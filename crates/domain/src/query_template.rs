use chrono::{DateTime, Utc};
use guardian_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Input payload for creating or editing a saved query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplateInput {
    /// Display name.
    pub name: String,
    /// Grouping shown in the library.
    pub category: String,
    /// Optional explanation.
    pub description: Option<String>,
    /// Statement text with `:name` placeholders.
    pub sql: String,
    /// Placeholders the statement expects.
    pub parameter_names: Vec<String>,
}

/// Saved statement in the query library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    id: Option<i64>,
    name: NonEmptyString,
    category: NonEmptyString,
    description: Option<String>,
    sql: NonEmptyString,
    parameter_names: Vec<String>,
    is_built_in: bool,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
}

impl QueryTemplate {
    /// Creates a validated user-defined template.
    pub fn new(input: QueryTemplateInput) -> AppResult<Self> {
        let QueryTemplateInput {
            name,
            category,
            description,
            sql,
            parameter_names,
        } = input;

        let mut names: Vec<String> = Vec::with_capacity(parameter_names.len());
        for parameter in parameter_names {
            let parameter = parameter.trim().trim_start_matches(':').to_owned();
            if parameter.is_empty() {
                continue;
            }
            if !parameter
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_')
            {
                return Err(AppError::Validation(format!(
                    "parameter name '{parameter}' may only contain letters, digits and '_'"
                )));
            }
            if !names.contains(&parameter) {
                names.push(parameter);
            }
        }

        let description = description.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            id: None,
            name: NonEmptyString::new(name.trim())?,
            category: NonEmptyString::new(category.trim())?,
            description,
            sql: NonEmptyString::new(sql)?,
            parameter_names: names,
            is_built_in: false,
            created_at: Utc::now(),
            modified_at: None,
        })
    }

    /// Marks the template as shipped with the tool.
    #[must_use]
    pub fn built_in(mut self) -> Self {
        self.is_built_in = true;
        self
    }

    /// Attaches the persisted identifier.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Attaches stored timestamps.
    #[must_use]
    pub fn with_timestamps(
        mut self,
        created_at: DateTime<Utc>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    /// Returns the persisted identifier.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the category.
    #[must_use]
    pub fn category(&self) -> &str {
        self.category.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        self.sql.as_str()
    }

    /// Returns declared placeholder names.
    #[must_use]
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Returns whether the statement declares placeholders.
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameter_names.is_empty()
    }

    /// Returns whether the template ships with the tool.
    #[must_use]
    pub fn is_built_in(&self) -> bool {
        self.is_built_in
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last edit timestamp.
    #[must_use]
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }
}
