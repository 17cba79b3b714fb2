use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::DEFAULT_PASSING_SCORE;
use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::test::Test;
use crate::models::test_result::{
    AttemptStatus, ResultAnswer, ResultFilter, ResultGuard, TestResult,
};
use crate::services::grading_service::GradingService;
use crate::utils::time::Clock;
use crate::utils::validation::ENTITY;

#[derive(Debug, Clone, Serialize)]
pub struct AnswerSubmission {
    pub result: TestResult,
    /// `None` when the question is not auto-graded.
    pub is_correct: Option<bool>,
}

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    default_passing_score: i32,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            default_passing_score: DEFAULT_PASSING_SCORE,
        }
    }

    pub fn with_default_passing_score(mut self, passing_score: i32) -> Self {
        self.default_passing_score = passing_score;
        self
    }

    pub async fn start_attempt(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        total_questions: i32,
    ) -> Result<TestResult> {
        if self.store.find_user(user_id).await?.is_none() {
            return Err(Error::not_found("User", user_id));
        }
        let test = self.load_test(test_id).await?;

        let result = TestResult::start(user_id, test.id, total_questions, self.clock.now())?;
        let result = self.store.insert_result(&result).await?;
        tracing::info!(
            result_id = %result.id,
            user_id = %user_id,
            test_id = %test_id,
            total_questions,
            "Attempt started"
        );
        Ok(result)
    }

    pub async fn get_result(&self, result_id: Uuid) -> Result<TestResult> {
        self.store
            .find_result(result_id)
            .await?
            .ok_or_else(|| Error::not_found("Test result", result_id))
    }

    /// Overwrites the running count of correct answers.
    pub async fn record_progress(
        &self,
        result_id: Uuid,
        correct_answers: i32,
    ) -> Result<TestResult> {
        let mut result = self.get_result(result_id).await?;
        let guard = result.guard();
        result.record_progress(correct_answers, self.clock.now())?;
        self.write(&result, guard, "record progress on").await
    }

    /// Grades one question and bumps `correct_answers` when right.
    ///
    /// Each question is answered at most once per attempt; a second
    /// submission fails on `question_id` and leaves the count alone.
    pub async fn submit_answer(
        &self,
        result_id: Uuid,
        question_id: Uuid,
        selected_answer_ids: &[Uuid],
    ) -> Result<AnswerSubmission> {
        let result = self.get_result(result_id).await?;
        result.ensure_in_progress("submit an answer to")?;

        let question = self
            .store
            .find_question(question_id)
            .await?
            .ok_or_else(|| Error::not_found("Question", question_id))?;
        if question.test_id != result.test_id {
            return Err(Error::invalid(
                "question_id",
                "foreign_question",
                "Question does not belong to the attempted test",
            ));
        }

        if self
            .store
            .list_result_answers(result_id)
            .await?
            .iter()
            .any(|a| a.question_id == question_id)
        {
            return Err(Error::invalid(
                "question_id",
                "already_answered",
                "Question has already been answered in this attempt",
            ));
        }

        let answers = self.store.list_answers(question_id).await?;
        let is_correct =
            GradingService::evaluate_selection(question.question_type, &answers, selected_answer_ids)?;

        let now = self.clock.now();
        if is_correct == Some(true) {
            result.clone().record_progress(result.correct_answers + 1, now)?;
        }

        let answer = ResultAnswer {
            result_id,
            question_id,
            selected_answer_ids: selected_answer_ids.to_vec(),
            is_correct,
            created_at: now,
        };
        let result = match self.store.record_answer(&answer).await? {
            Some(updated) => updated,
            None => return Err(self.refused(result_id, "submit an answer to").await),
        };

        tracing::debug!(
            result_id = %result_id,
            question_id = %question_id,
            ?is_correct,
            "Answer submitted"
        );
        Ok(AnswerSubmission { result, is_correct })
    }

    /// Answers recorded for the attempt, oldest first.
    pub async fn list_submissions(&self, result_id: Uuid) -> Result<Vec<ResultAnswer>> {
        self.get_result(result_id).await?;
        self.store.list_result_answers(result_id).await
    }

    /// Scores the attempt and marks it completed. Only valid once.
    pub async fn complete(&self, result_id: Uuid) -> Result<TestResult> {
        let mut result = self.get_result(result_id).await?;
        let guard = result.guard();
        if let Err(e) = result.complete(self.clock.now()) {
            tracing::warn!(result_id = %result_id, status = %result.status, "Refusing to complete attempt");
            return Err(e);
        }

        let completed = self.write(&result, guard, "complete").await?;
        tracing::info!(
            result_id = %completed.id,
            score = %completed.score,
            correct_answers = completed.correct_answers,
            total_questions = completed.total_questions,
            time_spent = ?completed.time_spent,
            "Attempt completed"
        );
        Ok(completed)
    }

    /// Caller-driven move to `failed` or `abandoned`.
    pub async fn transition(&self, result_id: Uuid, status: AttemptStatus) -> Result<TestResult> {
        let mut result = self.get_result(result_id).await?;
        let guard = result.guard();
        result.transition_to(status, self.clock.now())?;
        let updated = self.write(&result, guard, "close").await?;
        tracing::info!(result_id = %result_id, status = %status, "Attempt closed");
        Ok(updated)
    }

    pub async fn passed(&self, result_id: Uuid) -> Result<bool> {
        let result = self.get_result(result_id).await?;
        let test = self.load_test(result.test_id).await?;
        Ok(result.passed(test.passing_score))
    }

    pub async fn failed(&self, result_id: Uuid) -> Result<bool> {
        let result = self.get_result(result_id).await?;
        let test = self.load_test(result.test_id).await?;
        Ok(result.failed(test.passing_score))
    }

    pub async fn in_progress(&self, result_id: Uuid) -> Result<bool> {
        Ok(self.get_result(result_id).await?.is_in_progress())
    }

    /// Newest first.
    pub async fn list_results(&self, filter: ResultFilter) -> Result<Vec<TestResult>> {
        self.store.list_results(&filter).await
    }

    /// Completed results scoring at least `passing_score`, or the configured
    /// default threshold when `None`.
    pub async fn passed_results(
        &self,
        test_id: Option<Uuid>,
        passing_score: Option<i32>,
    ) -> Result<Vec<TestResult>> {
        let threshold = passing_score.unwrap_or(self.default_passing_score);
        Ok(self
            .completed_results(test_id)
            .await?
            .into_iter()
            .filter(|r| r.passed(threshold))
            .collect())
    }

    /// Completed results scoring below `passing_score`, or the configured
    /// default threshold when `None`.
    pub async fn failed_results(
        &self,
        test_id: Option<Uuid>,
        passing_score: Option<i32>,
    ) -> Result<Vec<TestResult>> {
        let threshold = passing_score.unwrap_or(self.default_passing_score);
        Ok(self
            .completed_results(test_id)
            .await?
            .into_iter()
            .filter(|r| r.failed(threshold))
            .collect())
    }

    /// Moves every running attempt that outlived its test's time limit to
    /// `abandoned`. Never called implicitly; schedule it if you need it.
    pub async fn abandon_overdue(&self) -> Result<Vec<TestResult>> {
        let now = self.clock.now();
        let running = self
            .store
            .list_results(&ResultFilter {
                status: Some(AttemptStatus::InProgress),
                ..Default::default()
            })
            .await?;

        let mut tests: HashMap<Uuid, Option<Test>> = HashMap::new();
        let mut abandoned = Vec::new();
        for mut result in running {
            if !tests.contains_key(&result.test_id) {
                let test = self.store.find_test(result.test_id).await?;
                tests.insert(result.test_id, test);
            }
            let limit = tests
                .get(&result.test_id)
                .and_then(|t| t.as_ref())
                .and_then(Test::time_limit_duration);
            let Some(limit) = limit else { continue };
            if result.started_at + limit >= now {
                continue;
            }

            let guard = result.guard();
            result.transition_to(AttemptStatus::Abandoned, now)?;
            match self.store.update_result(&result, guard).await? {
                Some(updated) => abandoned.push(updated),
                None => tracing::debug!(result_id = %result.id, "Attempt closed concurrently"),
            }
        }

        if !abandoned.is_empty() {
            tracing::info!(count = abandoned.len(), "Abandoned overdue attempts");
        }
        Ok(abandoned)
    }

    async fn completed_results(&self, test_id: Option<Uuid>) -> Result<Vec<TestResult>> {
        self.store
            .list_results(&ResultFilter {
                test_id,
                status: Some(AttemptStatus::Completed),
                ..Default::default()
            })
            .await
    }

    async fn load_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::not_found("Test", test_id))
    }

    /// Stores `result` only while the stored row still matches `guard`.
    async fn write(
        &self,
        result: &TestResult,
        guard: ResultGuard,
        action: &'static str,
    ) -> Result<TestResult> {
        match self.store.update_result(result, guard).await? {
            Some(updated) => Ok(updated),
            None => Err(self.refused(result.id, action).await),
        }
    }

    /// Explains why a guarded write on `result_id` did not land.
    async fn refused(&self, result_id: Uuid, action: &'static str) -> Error {
        let current = match self.get_result(result_id).await {
            Ok(current) => current,
            Err(e) => return e,
        };
        tracing::warn!(
            result_id = %result_id,
            status = %current.status,
            "Attempt changed during write"
        );
        if current.is_in_progress() {
            return Error::invalid(ENTITY, "stale", "Attempt changed concurrently, reload it");
        }
        Error::InvalidTransition {
            status: current.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::category::NewCategory;
    use crate::models::test::NewTest;
    use crate::models::user::{NewUser, UserRole};
    use crate::utils::time::{FixedClock, MockClock};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 31, 15, 3, 32).unwrap()
    }

    async fn seed(store: &MemoryStore, time_limit: Option<i32>) -> (Uuid, Uuid) {
        use crate::database::repository::{CategoryRepository, TestRepository, UserRepository};

        let user = store
            .insert_user(&NewUser {
                email: format!("{}@example.com", Uuid::new_v4()),
                first_name: Some("Grace".into()),
                last_name: Some("Hopper".into()),
                role: UserRole::Teacher,
            })
            .await
            .unwrap();
        let category = store
            .insert_category(&NewCategory {
                title: format!("Category {}", Uuid::new_v4()),
                description: None,
            })
            .await
            .unwrap();
        let test = store
            .insert_test(&NewTest {
                category_id: category.id,
                author_id: user.id,
                title: "Basics".into(),
                level: 1,
                description: None,
                time_limit,
                passing_score: 70,
                published: true,
            })
            .await
            .unwrap();
        (user.id, test.id)
    }

    #[tokio::test]
    async fn complete_uses_the_clock_for_time_spent() {
        let store = MemoryStore::new();
        let (user_id, test_id) = seed(&store, None).await;

        let mut clock = MockClock::new();
        let mut seq = mockall::Sequence::new();
        clock
            .expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(t0());
        clock
            .expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(t0() + Duration::seconds(754));

        let service = AttemptService::new(Arc::new(store), Arc::new(clock));
        let started = service.start_attempt(user_id, test_id, 4).await.unwrap();
        assert_eq!(started.started_at, t0());

        let done = service.complete(started.id).await.unwrap();
        assert_eq!(done.status, AttemptStatus::Completed);
        assert_eq!(done.time_spent, Some(754));
        assert_eq!(done.completed_at, Some(t0() + Duration::seconds(754)));
        assert_eq!(done.score, Decimal::ZERO);
    }

    #[tokio::test]
    async fn second_complete_fails() {
        let store = MemoryStore::new();
        let (user_id, test_id) = seed(&store, None).await;
        let service = AttemptService::new(Arc::new(store), Arc::new(FixedClock::new(t0())));

        let started = service.start_attempt(user_id, test_id, 3).await.unwrap();
        service.record_progress(started.id, 1).await.unwrap();
        let done = service.complete(started.id).await.unwrap();
        assert_eq!(done.score, Decimal::new(3333, 2));

        let err = service.complete(started.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                status: AttemptStatus::Completed,
                ..
            }
        ));
        assert_eq!(service.get_result(started.id).await.unwrap().score, done.score);
    }

    #[tokio::test]
    async fn start_requires_existing_user_and_test() {
        let store = MemoryStore::new();
        let (user_id, test_id) = seed(&store, None).await;
        let service = AttemptService::new(Arc::new(store), Arc::new(FixedClock::new(t0())));

        let err = service
            .start_attempt(Uuid::new_v4(), test_id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = service
            .start_attempt(user_id, Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    async fn seed_question(store: &MemoryStore, test_id: Uuid) -> (Uuid, Uuid, Uuid) {
        use crate::database::repository::{AnswerRepository, QuestionRepository};
        use crate::models::answer::NewAnswer;
        use crate::models::question::{NewQuestion, QuestionType};

        let question = store
            .insert_question(&NewQuestion {
                test_id,
                body: "Which keyword declares a constant?".into(),
                position: 1,
                question_type: QuestionType::SingleChoice,
                points: 1,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for (position, (body, is_correct)) in [("const", true), ("var", false)].into_iter().enumerate() {
            let answer = store
                .insert_answer(&NewAnswer {
                    question_id: question.id,
                    body: body.into(),
                    is_correct,
                    position: position as i32 + 1,
                })
                .await
                .unwrap();
            ids.push(answer.id);
        }
        (question.id, ids[0], ids[1])
    }

    #[tokio::test]
    async fn repeated_submission_does_not_inflate_the_count() {
        let store = MemoryStore::new();
        let (user_id, test_id) = seed(&store, None).await;
        let (question_id, right, wrong) = seed_question(&store, test_id).await;
        let service = AttemptService::new(Arc::new(store), Arc::new(FixedClock::new(t0())));

        let started = service.start_attempt(user_id, test_id, 3).await.unwrap();
        let first = service
            .submit_answer(started.id, question_id, &[right])
            .await
            .unwrap();
        assert_eq!(first.is_correct, Some(true));
        assert_eq!(first.result.correct_answers, 1);

        for selection in [[right], [wrong]] {
            let err = service
                .submit_answer(started.id, question_id, &selection)
                .await
                .unwrap_err();
            assert!(err.is_invalid("question_id"));
        }
        assert_eq!(service.get_result(started.id).await.unwrap().correct_answers, 1);

        let submissions = service.list_submissions(started.id).await.unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].selected_answer_ids, vec![right]);
        assert_eq!(submissions[0].is_correct, Some(true));
    }

    #[tokio::test]
    async fn stale_write_is_refused_while_attempt_runs() {
        let store = Arc::new(MemoryStore::new());
        let (user_id, test_id) = seed(&store, None).await;
        let service = AttemptService::new(store.clone(), Arc::new(FixedClock::new(t0())));

        let started = service.start_attempt(user_id, test_id, 3).await.unwrap();
        let stale = started.guard();
        service.record_progress(started.id, 2).await.unwrap();

        let mut late = started.clone();
        late.record_progress(1, t0()).unwrap();
        let err = service.write(&late, stale, "record progress on").await.unwrap_err();
        assert!(err.is_entity_invalid());
        assert_eq!(service.get_result(started.id).await.unwrap().correct_answers, 2);
    }

    #[tokio::test]
    async fn overdue_attempts_are_abandoned_only_when_asked() {
        let store = MemoryStore::new();
        let (user_id, timed_test) = seed(&store, Some(30)).await;
        let (_, untimed_test) = seed(&store, None).await;
        let clock = Arc::new(FixedClock::new(t0()));
        let service = AttemptService::new(Arc::new(store), clock.clone());

        let timed = service.start_attempt(user_id, timed_test, 5).await.unwrap();
        let untimed = service.start_attempt(user_id, untimed_test, 5).await.unwrap();

        clock.advance(Duration::minutes(31));
        assert!(service.in_progress(timed.id).await.unwrap());

        let abandoned = service.abandon_overdue().await.unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id, timed.id);
        assert_eq!(abandoned[0].status, AttemptStatus::Abandoned);
        assert!(service.in_progress(untimed.id).await.unwrap());

        assert!(service.abandon_overdue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn threshold_listings_default_to_configured_score() {
        let store = MemoryStore::new();
        let (user_id, test_id) = seed(&store, None).await;
        let service = AttemptService::new(Arc::new(store), Arc::new(FixedClock::new(t0())))
            .with_default_passing_score(60);

        for correct in [5, 6, 7] {
            let r = service.start_attempt(user_id, test_id, 10).await.unwrap();
            service.record_progress(r.id, correct).await.unwrap();
            service.complete(r.id).await.unwrap();
        }
        service.start_attempt(user_id, test_id, 10).await.unwrap();

        assert_eq!(service.passed_results(Some(test_id), None).await.unwrap().len(), 2);
        assert_eq!(service.failed_results(Some(test_id), None).await.unwrap().len(), 1);
        assert_eq!(service.passed_results(Some(test_id), Some(70)).await.unwrap().len(), 1);
        assert_eq!(service.failed_results(None, Some(70)).await.unwrap().len(), 2);
    }
}
