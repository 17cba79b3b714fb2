//! Storage seams for the catalog and attempts.
//!
//! Implementations enforce the unique and foreign-key constraints themselves;
//! services only run advisory checks before writing. A violated unique
//! constraint surfaces as [`Error::Validation`](crate::error::Error) on the
//! guarded field, a missing parent as `NotFound`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, NewAnswer};
use crate::models::category::{Category, NewCategory};
use crate::models::question::{NewQuestion, Question, QuestionType};
use crate::models::test::{NewTest, Test, TestFilter};
use crate::models::test_result::{ResultAnswer, ResultFilter, ResultGuard, TestResult};
use crate::models::user::{NewUser, User, UserRole};

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn insert_category(&self, new: &NewCategory) -> Result<Category>;
    async fn update_category(&self, category: &Category) -> Result<Category>;
    async fn find_category(&self, id: Uuid) -> Result<Option<Category>>;
    /// Case-insensitive.
    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>>;
    /// Fails with `DeleteRestricted` while tests reference the category.
    async fn delete_category(&self, id: Uuid) -> Result<bool>;
    /// Ordered by title.
    async fn list_categories(&self) -> Result<Vec<Category>>;
    /// Categories owning at least one test, ordered by title.
    async fn list_categories_with_tests(&self) -> Result<Vec<Category>>;
    /// `(category_id, tests)` for every category, including empty ones.
    async fn count_tests_by_category(&self) -> Result<Vec<(Uuid, i64)>>;
}

#[async_trait]
pub trait TestRepository: Send + Sync {
    async fn insert_test(&self, new: &NewTest) -> Result<Test>;
    async fn update_test(&self, test: &Test) -> Result<Test>;
    async fn find_test(&self, id: Uuid) -> Result<Option<Test>>;
    async fn find_test_by_title(&self, category_id: Uuid, title: &str) -> Result<Option<Test>>;
    /// Removes the test with its questions, answers and results.
    async fn delete_test(&self, id: Uuid) -> Result<bool>;
    /// Ordered by title.
    async fn list_tests(&self, filter: &TestFilter) -> Result<Vec<Test>>;
    /// Newest first.
    async fn recent_tests(&self, limit: i64) -> Result<Vec<Test>>;
    async fn count_tests(&self, category_id: Uuid) -> Result<i64>;
    /// Titles of the tests in the category with this exact title, descending.
    async fn titles_by_category(&self, category_title: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn insert_question(&self, new: &NewQuestion) -> Result<Question>;
    async fn update_question(&self, question: &Question) -> Result<Question>;
    async fn find_question(&self, id: Uuid) -> Result<Option<Question>>;
    async fn find_question_at(&self, test_id: Uuid, position: i32) -> Result<Option<Question>>;
    /// Removes the question with its answers.
    async fn delete_question(&self, id: Uuid) -> Result<bool>;
    /// Ordered by position, optionally narrowed to one type.
    async fn list_questions(
        &self,
        test_id: Uuid,
        question_type: Option<QuestionType>,
    ) -> Result<Vec<Question>>;
    async fn count_questions(&self, test_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer>;
    async fn update_answer(&self, answer: &Answer) -> Result<Answer>;
    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>>;
    async fn delete_answer(&self, id: Uuid) -> Result<bool>;
    /// Ordered by position.
    async fn list_answers(&self, question_id: Uuid) -> Result<Vec<Answer>>;
}

#[async_trait]
pub trait TestResultRepository: Send + Sync {
    async fn insert_result(&self, result: &TestResult) -> Result<TestResult>;
    /// Writes `result` only while the stored row still matches `guard`.
    /// `Ok(None)` means another writer moved it first.
    async fn update_result(
        &self,
        result: &TestResult,
        guard: ResultGuard,
    ) -> Result<Option<TestResult>>;
    /// Stores `answer` and, when it is correct, increments the attempt's
    /// `correct_answers` in the same write. `Ok(None)` when the attempt is
    /// missing or no longer in progress. A second answer for the same question
    /// fails on `question_id`.
    async fn record_answer(&self, answer: &ResultAnswer) -> Result<Option<TestResult>>;
    /// Oldest first.
    async fn list_result_answers(&self, result_id: Uuid) -> Result<Vec<ResultAnswer>>;
    async fn find_result(&self, id: Uuid) -> Result<Option<TestResult>>;
    /// Newest first.
    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<TestResult>>;
    /// Mean score of the test's completed results, `None` when there are none.
    async fn average_score(&self, test_id: Uuid) -> Result<Option<Decimal>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, new: &NewUser) -> Result<User>;
    async fn update_user(&self, user: &User) -> Result<User>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Case-insensitive.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Ordered by email, optionally narrowed to one role.
    async fn list_users(&self, role: Option<UserRole>) -> Result<Vec<User>>;
    /// Distinct tests the user has results for, ordered by title.
    async fn list_user_tests(&self, user_id: Uuid, level: Option<i32>) -> Result<Vec<Test>>;
}

pub trait Repository:
    CategoryRepository
    + TestRepository
    + QuestionRepository
    + AnswerRepository
    + TestResultRepository
    + UserRepository
{
}

impl<T> Repository for T where
    T: CategoryRepository
        + TestRepository
        + QuestionRepository
        + AnswerRepository
        + TestResultRepository
        + UserRepository
{
}
