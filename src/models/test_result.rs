use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::services::grading_service::GradingService;
use crate::utils::time::elapsed_seconds;
use crate::utils::validation::validate_test_result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's attempt at a test.
///
/// Every mutating method leaves `self` untouched when it returns an error.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub test_id: Uuid,
    pub score: Decimal,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between `started_at` and `completed_at`.
    pub time_spent: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestResult {
    pub fn start(
        user_id: Uuid,
        test_id: Uuid,
        total_questions: i32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let result = Self {
            id: Uuid::new_v4(),
            user_id,
            test_id,
            score: Decimal::ZERO,
            correct_answers: 0,
            total_questions,
            status: AttemptStatus::InProgress,
            started_at: now,
            completed_at: None,
            time_spent: None,
            created_at: now,
            updated_at: now,
        };
        validate_test_result(&result)?;
        Ok(result)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    /// Completed with a score at or above `passing_score`.
    pub fn passed(&self, passing_score: i32) -> bool {
        self.status == AttemptStatus::Completed
            && GradingService::passes(self.score, passing_score)
    }

    /// Completed with a score below `passing_score`.
    pub fn failed(&self, passing_score: i32) -> bool {
        self.status == AttemptStatus::Completed
            && !GradingService::passes(self.score, passing_score)
    }

    pub fn ensure_in_progress(&self, action: &'static str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    pub fn record_progress(&mut self, correct_answers: i32, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("record progress on")?;
        let mut next = self.clone();
        next.correct_answers = correct_answers;
        next.updated_at = now;
        validate_test_result(&next)?;
        *self = next;
        Ok(())
    }

    /// Scores the attempt and moves it to `completed`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("complete")?;
        let mut next = self.clone();
        next.time_spent = Some(elapsed_seconds(self.started_at, now));
        next.score = GradingService::score(self.correct_answers, self.total_questions);
        next.completed_at = Some(now);
        next.status = AttemptStatus::Completed;
        next.updated_at = now;
        validate_test_result(&next)?;
        *self = next;
        Ok(())
    }

    /// Explicit move to `failed` or `abandoned`. The score is left as is.
    pub fn transition_to(&mut self, status: AttemptStatus, now: DateTime<Utc>) -> Result<()> {
        let action = match status {
            AttemptStatus::Failed => "fail",
            AttemptStatus::Abandoned => "abandon",
            AttemptStatus::Completed => "force-complete",
            AttemptStatus::InProgress => "reopen",
        };
        self.ensure_in_progress(action)?;
        if !matches!(status, AttemptStatus::Failed | AttemptStatus::Abandoned) {
            return Err(Error::InvalidTransition {
                status: self.status,
                action,
            });
        }
        let mut next = self.clone();
        next.time_spent = Some(elapsed_seconds(self.started_at, now));
        next.completed_at = Some(now);
        next.status = status;
        next.updated_at = now;
        validate_test_result(&next)?;
        *self = next;
        Ok(())
    }

    /// Snapshot to compare against when writing this attempt back.
    pub fn guard(&self) -> ResultGuard {
        ResultGuard {
            status: self.status,
            correct_answers: self.correct_answers,
        }
    }
}

/// What the stored row must still look like for a write to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultGuard {
    pub status: AttemptStatus,
    pub correct_answers: i32,
}

impl ResultGuard {
    pub fn holds(&self, stored: &TestResult) -> bool {
        stored.status == self.status && stored.correct_answers == self.correct_answers
    }
}

/// One graded submission inside an attempt. An attempt holds at most one per
/// question.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResultAnswer {
    pub result_id: Uuid,
    pub question_id: Uuid,
    pub selected_answer_ids: Vec<Uuid>,
    /// `None` for questions that are not auto-graded.
    pub is_correct: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultFilter {
    pub user_id: Option<Uuid>,
    pub test_id: Option<Uuid>,
    pub status: Option<AttemptStatus>,
}

impl ResultFilter {
    pub fn matches(&self, result: &TestResult) -> bool {
        self.user_id.map_or(true, |u| result.user_id == u)
            && self.test_id.map_or(true, |t| result.test_id == t)
            && self.status.map_or(true, |s| result.status == s)
    }
}
