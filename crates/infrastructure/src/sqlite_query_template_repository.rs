use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use guardian_application::QueryTemplateRepository;
use guardian_core::{AppError, AppResult};
use guardian_domain::{QueryTemplate, QueryTemplateInput};

/// SQLite-backed repository for the saved query library.
#[derive(Clone)]
pub struct SqliteQueryTemplateRepository {
    pool: SqlitePool,
}

impl SqliteQueryTemplateRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct QueryTemplateRow {
    id: i64,
    name: String,
    category: String,
    description: Option<String>,
    sql_text: String,
    parameter_names: String,
    is_built_in: bool,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
}

impl QueryTemplateRow {
    fn into_template(self) -> AppResult<QueryTemplate> {
        let template = QueryTemplate::new(QueryTemplateInput {
            name: self.name,
            category: self.category,
            description: self.description,
            sql: self.sql_text,
            parameter_names: self
                .parameter_names
                .split(',')
                .map(str::to_owned)
                .collect(),
        })?
        .with_id(self.id)
        .with_timestamps(self.created_at, self.modified_at);

        Ok(if self.is_built_in {
            template.built_in()
        } else {
            template
        })
    }
}

// Parameter names are restricted to `[A-Za-z0-9_]`, so a comma list is lossless.
fn joined_parameter_names(template: &QueryTemplate) -> String {
    template.parameter_names().join(",")
}

#[async_trait]
impl QueryTemplateRepository for SqliteQueryTemplateRepository {
    async fn list_templates(&self) -> AppResult<Vec<QueryTemplate>> {
        let rows = sqlx::query_as::<_, QueryTemplateRow>(
            r#"
            SELECT id, name, category, description, sql_text, parameter_names,
                   is_built_in, created_at, modified_at
            FROM query_templates
            ORDER BY category, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list query templates: {error}")))?;

        rows.into_iter().map(QueryTemplateRow::into_template).collect()
    }

    async fn find_template(&self, template_id: i64) -> AppResult<Option<QueryTemplate>> {
        let row = sqlx::query_as::<_, QueryTemplateRow>(
            r#"
            SELECT id, name, category, description, sql_text, parameter_names,
                   is_built_in, created_at, modified_at
            FROM query_templates
            WHERE id = ?
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find query template {template_id}: {error}"))
        })?;

        row.map(QueryTemplateRow::into_template).transpose()
    }

    async fn insert_template(&self, template: &QueryTemplate) -> AppResult<QueryTemplate> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO query_templates (
                name,
                category,
                description,
                sql_text,
                parameter_names,
                is_built_in,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(template.name())
        .bind(template.category())
        .bind(template.description())
        .bind(template.sql())
        .bind(joined_parameter_names(template))
        .bind(template.is_built_in())
        .bind(template.created_at())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert query template '{}': {error}",
                template.name()
            ))
        })?;

        Ok(template.clone().with_id(id))
    }

    async fn update_template(&self, template: &QueryTemplate) -> AppResult<QueryTemplate> {
        let Some(template_id) = template.id() else {
            return Err(AppError::Validation(
                "cannot update a query template that was never saved".to_owned(),
            ));
        };

        let modified_at = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE query_templates
            SET name = ?,
                category = ?,
                description = ?,
                sql_text = ?,
                parameter_names = ?,
                modified_at = ?
            WHERE id = ? AND is_built_in = 0
            "#,
        )
        .bind(template.name())
        .bind(template.category())
        .bind(template.description())
        .bind(template.sql())
        .bind(joined_parameter_names(template))
        .bind(modified_at)
        .bind(template_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update query template {template_id}: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "editable query template {template_id} does not exist"
            )));
        }

        Ok(template
            .clone()
            .with_timestamps(template.created_at(), Some(modified_at)))
    }

    async fn delete_template(&self, template_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM query_templates WHERE id = ? AND is_built_in = 0")
            .bind(template_id)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete query template {template_id}: {error}"
                ))
            })?;

        Ok(())
    }

    async fn count_built_in_templates(&self) -> AppResult<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM query_templates WHERE is_built_in = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to count built-in templates: {error}"))
                })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
