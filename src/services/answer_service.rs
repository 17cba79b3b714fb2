use std::sync::Arc;

use uuid::Uuid;

use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerPartition, NewAnswer, UpdateAnswer};
use crate::utils::validation::validate;

/// Answer writes never re-check the owning question's correct-answer rule;
/// callers that flip `is_correct` follow up with
/// `QuestionService::validate_question`.
#[derive(Clone)]
pub struct AnswerService {
    store: Arc<dyn Repository>,
}

impl AnswerService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    pub async fn create_answer(&self, mut payload: NewAnswer) -> Result<Answer> {
        payload.body = payload.body.trim().to_string();
        validate(&payload)?;
        if self.store.find_question(payload.question_id).await?.is_none() {
            return Err(Error::not_found("Question", payload.question_id));
        }
        self.store.insert_answer(&payload).await
    }

    pub async fn get_answer(&self, answer_id: Uuid) -> Result<Answer> {
        self.store
            .find_answer(answer_id)
            .await?
            .ok_or_else(|| Error::not_found("Answer", answer_id))
    }

    pub async fn update_answer(&self, answer_id: Uuid, mut patch: UpdateAnswer) -> Result<Answer> {
        patch.body = patch.body.map(|b| b.trim().to_string());
        validate(&patch)?;
        let mut answer = self.get_answer(answer_id).await?;
        answer.apply(patch);
        self.store.update_answer(&answer).await
    }

    pub async fn delete_answer(&self, answer_id: Uuid) -> Result<()> {
        if !self.store.delete_answer(answer_id).await? {
            return Err(Error::not_found("Answer", answer_id));
        }
        Ok(())
    }

    /// Ordered by position.
    pub async fn list_answers(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        self.store.list_answers(question_id).await
    }

    pub async fn partition_answers(&self, question_id: Uuid) -> Result<AnswerPartition> {
        let answers = self.store.list_answers(question_id).await?;
        Ok(AnswerPartition::from_answers(answers))
    }
}
