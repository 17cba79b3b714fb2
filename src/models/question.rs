use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    SingleChoice,
    MultipleChoice,
    Text,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Text => "text",
        }
    }

    /// Choice questions are graded against their answers; free text is not.
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleChoice)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown question type '{}'", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub body: String,
    pub position: i32,
    pub question_type: QuestionType,
    pub points: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn apply(&mut self, patch: UpdateQuestion) {
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(question_type) = patch.question_type {
            self.question_type = question_type;
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
    }
}

fn default_points() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewQuestion {
    pub test_id: Uuid,
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 10, max = 2000, message = "Body must be between 10 and 2000 characters")
    )]
    pub body: String,
    #[validate(range(min = 1, message = "Position must be greater than 0"))]
    pub position: i32,
    #[serde(default, rename = "type")]
    pub question_type: QuestionType,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, max = 100, message = "Points must be between 1 and 100"))]
    pub points: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateQuestion {
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 10, max = 2000, message = "Body must be between 10 and 2000 characters")
    )]
    pub body: Option<String>,
    #[validate(range(min = 1, message = "Position must be greater than 0"))]
    pub position: Option<i32>,
    #[serde(default, rename = "type")]
    pub question_type: Option<QuestionType>,
    #[validate(range(min = 1, max = 100, message = "Points must be between 1 and 100"))]
    pub points: Option<i32>,
}
