use std::sync::Arc;

use tracing::info;

use guardian_core::{AppError, AppResult};
use guardian_domain::QueryTemplate;

use crate::cache_ports::QueryTemplateRepository;

mod built_ins;

/// Application service for the saved query library.
#[derive(Clone)]
pub struct QueryLibraryService {
    repository: Arc<dyn QueryTemplateRepository>,
}

impl QueryLibraryService {
    /// Creates a library service.
    #[must_use]
    pub fn new(repository: Arc<dyn QueryTemplateRepository>) -> Self {
        Self { repository }
    }

    /// Seeds the shipped templates unless any built-in template already exists.
    ///
    /// Returns the number of templates inserted.
    pub async fn ensure_built_in_templates(&self) -> AppResult<usize> {
        if self.repository.count_built_in_templates().await? > 0 {
            return Ok(0);
        }

        let templates = built_ins::built_in_templates()?;
        for template in &templates {
            self.repository.insert_template(template).await?;
        }

        info!(count = templates.len(), "seeded built-in query templates");
        Ok(templates.len())
    }

    /// Lists all templates ordered by category and name.
    pub async fn list_templates(&self) -> AppResult<Vec<QueryTemplate>> {
        self.repository.list_templates().await
    }

    /// Lists templates of one category, ignoring case.
    pub async fn templates_in_category(&self, category: &str) -> AppResult<Vec<QueryTemplate>> {
        let category = category.trim();
        Ok(self
            .repository
            .list_templates()
            .await?
            .into_iter()
            .filter(|template| template.category().eq_ignore_ascii_case(category))
            .collect())
    }

    /// Lists distinct categories in display order.
    pub async fn categories(&self) -> AppResult<Vec<String>> {
        let mut categories: Vec<String> = self
            .repository
            .list_templates()
            .await?
            .iter()
            .map(|template| template.category().to_owned())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    /// Returns one template or `NotFound`.
    pub async fn find_template(&self, template_id: i64) -> AppResult<QueryTemplate> {
        self.repository
            .find_template(template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("query template {template_id} does not exist")))
    }

    /// Inserts a new template or updates an existing user template.
    pub async fn save_template(&self, template: QueryTemplate) -> AppResult<QueryTemplate> {
        match template.id() {
            None => self.repository.insert_template(&template).await,
            Some(template_id) => {
                let existing = self.find_template(template_id).await?;
                if existing.is_built_in() {
                    return Err(AppError::Validation(format!(
                        "built-in template '{}' cannot be modified",
                        existing.name()
                    )));
                }
                self.repository.update_template(&template).await
            }
        }
    }

    /// Deletes a user template. Built-in templates are kept.
    pub async fn delete_template(&self, template_id: i64) -> AppResult<()> {
        let existing = self.find_template(template_id).await?;
        if existing.is_built_in() {
            return Err(AppError::Validation(format!(
                "built-in template '{}' cannot be deleted",
                existing.name()
            )));
        }

        self.repository.delete_template(template_id).await
    }
}
