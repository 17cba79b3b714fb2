use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::category::{Category, CategoryTestCount, NewCategory, UpdateCategory};
use crate::utils::validation::validate;

#[derive(Clone)]
pub struct CategoryService {
    store: Arc<dyn Repository>,
}

impl CategoryService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    pub async fn create_category(&self, mut payload: NewCategory) -> Result<Category> {
        payload.title = payload.title.trim().to_string();
        validate(&payload)?;

        if self
            .store
            .find_category_by_title(&payload.title)
            .await?
            .is_some()
        {
            return Err(Error::taken("title"));
        }

        let category = self.store.insert_category(&payload).await?;
        tracing::info!(category_id = %category.id, title = %category.title, "Category created");
        Ok(category)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.store
            .find_category(id)
            .await?
            .ok_or_else(|| Error::not_found("Category", id))
    }

    pub async fn update_category(&self, id: Uuid, mut patch: UpdateCategory) -> Result<Category> {
        patch.title = patch.title.map(|t| t.trim().to_string());
        validate(&patch)?;
        let mut category = self.get_category(id).await?;

        if let Some(title) = &patch.title {
            if let Some(existing) = self.store.find_category_by_title(title).await? {
                if existing.id != id {
                    return Err(Error::taken("title"));
                }
            }
        }

        category.apply(patch);
        self.store.update_category(&category).await
    }

    /// Refused while the category still owns tests.
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        let category = self.get_category(id).await?;
        let tests = self.store.count_tests(id).await?;
        if tests > 0 {
            tracing::warn!(category_id = %id, tests, "Refusing to delete category with tests");
            return Err(Error::DeleteRestricted(format!(
                "Cannot delete category '{}' while it has {} test(s)",
                category.title, tests
            )));
        }

        if !self.store.delete_category(id).await? {
            return Err(Error::not_found("Category", id));
        }
        tracing::info!(category_id = %id, "Category deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.store.list_categories().await
    }

    pub async fn list_categories_with_tests(&self) -> Result<Vec<Category>> {
        self.store.list_categories_with_tests().await
    }

    pub async fn tests_count(&self, id: Uuid) -> Result<i64> {
        self.get_category(id).await?;
        self.store.count_tests(id).await
    }

    /// Every category, ordered by title, with its number of tests.
    pub async fn category_test_counts(&self) -> Result<Vec<CategoryTestCount>> {
        let counts: HashMap<Uuid, i64> = self
            .store
            .count_tests_by_category()
            .await?
            .into_iter()
            .collect();

        let categories = self.store.list_categories().await?;
        Ok(categories
            .into_iter()
            .map(|category| {
                let tests_count = counts.get(&category.id).copied().unwrap_or(0);
                CategoryTestCount {
                    category,
                    tests_count,
                }
            })
            .collect())
    }
}
