use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::test::{NewTest, Test, TestFilter, UpdateTest};
use crate::utils::validation::validate;

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn Repository>,
}

impl TestService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    pub async fn create_test(&self, mut payload: NewTest) -> Result<Test> {
        payload.title = payload.title.trim().to_string();
        validate(&payload)?;

        if self.store.find_category(payload.category_id).await?.is_none() {
            return Err(Error::not_found("Category", payload.category_id));
        }
        if self.store.find_user(payload.author_id).await?.is_none() {
            return Err(Error::not_found("User", payload.author_id));
        }
        if self
            .store
            .find_test_by_title(payload.category_id, &payload.title)
            .await?
            .is_some()
        {
            return Err(Error::taken("title"));
        }

        let test = self.store.insert_test(&payload).await?;
        tracing::info!(test_id = %test.id, category_id = %test.category_id, "Test created");
        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::not_found("Test", test_id))
    }

    pub async fn update_test(&self, test_id: Uuid, mut patch: UpdateTest) -> Result<Test> {
        patch.title = patch.title.map(|t| t.trim().to_string());
        validate(&patch)?;
        let mut test = self.get_test(test_id).await?;

        if let Some(category_id) = patch.category_id {
            if self.store.find_category(category_id).await?.is_none() {
                return Err(Error::not_found("Category", category_id));
            }
        }

        test.apply(patch);
        if let Some(existing) = self
            .store
            .find_test_by_title(test.category_id, &test.title)
            .await?
        {
            if existing.id != test.id {
                return Err(Error::taken("title"));
            }
        }

        self.store.update_test(&test).await
    }

    /// Removes the test together with its questions, answers and results.
    pub async fn delete_test(&self, test_id: Uuid) -> Result<()> {
        if !self.store.delete_test(test_id).await? {
            return Err(Error::not_found("Test", test_id));
        }
        tracing::info!(test_id = %test_id, "Test deleted");
        Ok(())
    }

    pub async fn list_tests(&self, filter: TestFilter) -> Result<Vec<Test>> {
        self.store.list_tests(&filter).await
    }

    pub async fn list_category_tests(&self, category_id: Uuid) -> Result<Vec<Test>> {
        if self.store.find_category(category_id).await?.is_none() {
            return Err(Error::not_found("Category", category_id));
        }
        self.store
            .list_tests(&TestFilter {
                category_id: Some(category_id),
                ..Default::default()
            })
            .await
    }

    pub async fn recent_tests(&self, limit: i64) -> Result<Vec<Test>> {
        self.store.recent_tests(limit.max(0)).await
    }

    pub async fn titles_by_category(&self, category_title: &str) -> Result<Vec<String>> {
        self.store.titles_by_category(category_title).await
    }

    pub async fn questions_count(&self, test_id: Uuid) -> Result<i64> {
        self.get_test(test_id).await?;
        self.store.count_questions(test_id).await
    }

    /// Mean score over completed results; zero when nobody has finished.
    pub async fn average_score(&self, test_id: Uuid) -> Result<Decimal> {
        self.get_test(test_id).await?;
        let mut average = self
            .store
            .average_score(test_id)
            .await?
            .unwrap_or(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        average.rescale(2);
        Ok(average)
    }
}
