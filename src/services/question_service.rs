use std::sync::Arc;

use uuid::Uuid;

use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, Question, QuestionType, UpdateQuestion};
use crate::utils::validation::{validate, validate_question_answers, ValidationMode};

#[derive(Clone)]
pub struct QuestionService {
    store: Arc<dyn Repository>,
}

impl QuestionService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    pub async fn create_question(&self, mut payload: NewQuestion) -> Result<Question> {
        payload.body = payload.body.trim().to_string();
        validate(&payload)?;

        if self.store.find_test(payload.test_id).await?.is_none() {
            return Err(Error::not_found("Test", payload.test_id));
        }
        if self
            .store
            .find_question_at(payload.test_id, payload.position)
            .await?
            .is_some()
        {
            return Err(Error::taken("position"));
        }

        let question = self.store.insert_question(&payload).await?;
        tracing::info!(
            question_id = %question.id,
            test_id = %question.test_id,
            question_type = %question.question_type,
            "Question created"
        );
        Ok(question)
    }

    pub async fn get_question(&self, question_id: Uuid) -> Result<Question> {
        self.store
            .find_question(question_id)
            .await?
            .ok_or_else(|| Error::not_found("Question", question_id))
    }

    /// Applies `patch` and re-checks the correct-answer rule against the
    /// answers already attached.
    pub async fn update_question(
        &self,
        question_id: Uuid,
        mut patch: UpdateQuestion,
    ) -> Result<Question> {
        patch.body = patch.body.map(|b| b.trim().to_string());
        validate(&patch)?;
        let mut question = self.get_question(question_id).await?;

        if let Some(position) = patch.position {
            if let Some(existing) = self.store.find_question_at(question.test_id, position).await? {
                if existing.id != question_id {
                    return Err(Error::taken("position"));
                }
            }
        }

        question.apply(patch);
        let answers = self.store.list_answers(question_id).await?;
        validate_question_answers(question.question_type, &answers, ValidationMode::Update)?;

        self.store.update_question(&question).await
    }

    /// Runs the answer rule for a stored question without writing anything.
    pub async fn validate_question(&self, question_id: Uuid, mode: ValidationMode) -> Result<()> {
        let question = self.get_question(question_id).await?;
        let answers = self.store.list_answers(question_id).await?;
        validate_question_answers(question.question_type, &answers, mode)?;
        Ok(())
    }

    /// Removes the question and its answers.
    pub async fn delete_question(&self, question_id: Uuid) -> Result<()> {
        if !self.store.delete_question(question_id).await? {
            return Err(Error::not_found("Question", question_id));
        }
        Ok(())
    }

    /// Ordered by position.
    pub async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        self.store.list_questions(test_id, None).await
    }

    pub async fn list_questions_by_type(
        &self,
        test_id: Uuid,
        question_type: QuestionType,
    ) -> Result<Vec<Question>> {
        self.store.list_questions(test_id, Some(question_type)).await
    }
}
