use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub body: String,
    pub is_correct: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Answer {
    pub fn apply(&mut self, patch: UpdateAnswer) {
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(is_correct) = patch.is_correct {
            self.is_correct = is_correct;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
    }
}

fn default_position() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAnswer {
    pub question_id: Uuid,
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 1, max = 500, message = "Body must be between 1 and 500 characters")
    )]
    pub body: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default = "default_position")]
    #[validate(range(min = 1, message = "Position must be greater than 0"))]
    pub position: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateAnswer {
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 1, max = 500, message = "Body must be between 1 and 500 characters")
    )]
    pub body: Option<String>,
    pub is_correct: Option<bool>,
    #[validate(range(min = 1, message = "Position must be greater than 0"))]
    pub position: Option<i32>,
}

/// A question's answers split by correctness, each side kept in position order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerPartition {
    pub correct: Vec<Answer>,
    pub incorrect: Vec<Answer>,
}

impl AnswerPartition {
    pub fn from_answers(mut answers: Vec<Answer>) -> Self {
        answers.sort_by_key(|a| a.position);
        let (correct, incorrect) = answers.into_iter().partition(|a| a.is_correct);
        Self { correct, incorrect }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(position: i32, is_correct: bool) -> Answer {
        let now = Utc::now();
        Answer {
            id: Uuid::new_v4(),
            question_id: Uuid::nil(),
            body: format!("Option {}", position),
            is_correct,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn partition_keeps_position_order() {
        let split = AnswerPartition::from_answers(vec![
            answer(3, false),
            answer(2, true),
            answer(1, false),
            answer(4, true),
        ]);
        let correct: Vec<i32> = split.correct.iter().map(|a| a.position).collect();
        let incorrect: Vec<i32> = split.incorrect.iter().map(|a| a.position).collect();
        assert_eq!(correct, vec![2, 4]);
        assert_eq!(incorrect, vec![1, 3]);
    }

    #[test]
    fn empty_body_rejected() {
        let payload = NewAnswer {
            question_id: Uuid::new_v4(),
            body: String::new(),
            is_correct: false,
            position: 1,
        };
        assert!(payload.validate().is_err());
    }
}
