//! In-process store with the same constraint behaviour as the PostgreSQL
//! schema: unique keys, foreign keys, cascades and the category restrict.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::repository::{
    AnswerRepository, CategoryRepository, QuestionRepository, TestRepository,
    TestResultRepository, UserRepository,
};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::category::{Category, NewCategory};
use crate::models::question::{NewQuestion, Question, QuestionType};
use crate::models::test::{NewTest, Test, TestFilter};
use crate::models::test_result::{
    AttemptStatus, ResultAnswer, ResultFilter, ResultGuard, TestResult,
};
use crate::models::user::{normalize_email, NewUser, User, UserRole};
use crate::utils::time::{Clock, SystemClock};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    tests: HashMap<Uuid, Test>,
    questions: HashMap<Uuid, Question>,
    answers: HashMap<Uuid, Answer>,
    results: HashMap<Uuid, TestResult>,
    result_answers: HashMap<(Uuid, Uuid), ResultAnswer>,
}

impl State {
    fn category_title_taken(&self, title: &str, except: Option<Uuid>) -> bool {
        let title = title.to_lowercase();
        self.categories
            .values()
            .any(|c| Some(c.id) != except && c.title.to_lowercase() == title)
    }

    fn test_title_taken(&self, category_id: Uuid, title: &str, except: Option<Uuid>) -> bool {
        self.tests
            .values()
            .any(|t| Some(t.id) != except && t.category_id == category_id && t.title == title)
    }

    fn position_taken(&self, test_id: Uuid, position: i32, except: Option<Uuid>) -> bool {
        self.questions
            .values()
            .any(|q| Some(q.id) != except && q.test_id == test_id && q.position == position)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        let email = normalize_email(email);
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email == email)
    }

    fn remove_question_tree(&mut self, question_id: Uuid) -> bool {
        self.answers.retain(|_, a| a.question_id != question_id);
        self.result_answers
            .retain(|(_, question), _| *question != question_id);
        self.questions.remove(&question_id).is_some()
    }

    fn remove_test_tree(&mut self, test_id: Uuid) -> bool {
        let question_ids: Vec<Uuid> = self
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .map(|q| q.id)
            .collect();
        for id in question_ids {
            self.remove_question_tree(id);
        }
        self.results.retain(|_, r| r.test_id != test_id);
        let results = &self.results;
        self.result_answers
            .retain(|(result, _), _| results.contains_key(result));
        self.tests.remove(&test_id).is_some()
    }
}

fn missing(entity: &str, id: Uuid) -> Error {
    Error::not_found(entity, id)
}

/// Timestamps for rows it creates come from `clock`. Attempt rows keep the
/// timestamps their writer set.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn insert_category(&self, new: &NewCategory) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.category_title_taken(&new.title, None) {
            return Err(Error::taken("title"));
        }
        let at = self.clock.now();
        let category = Category {
            id: Uuid::new_v4(),
            title: new.title.clone(),
            description: new.description.clone(),
            created_at: at,
            updated_at: at,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<Category> {
        let mut state = self.state.write().await;
        if !state.categories.contains_key(&category.id) {
            return Err(missing("Category", category.id));
        }
        if state.category_title_taken(&category.title, Some(category.id)) {
            return Err(Error::taken("title"));
        }
        let mut updated = category.clone();
        updated.updated_at = self.clock.now();
        state.categories.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>> {
        let title = title.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .find(|c| c.title.to_lowercase() == title)
            .cloned())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.tests.values().any(|t| t.category_id == id) {
            return Err(Error::DeleteRestricted(format!(
                "Category {} still has tests and cannot be deleted",
                id
            )));
        }
        Ok(state.categories.remove(&id).is_some())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut rows: Vec<Category> = state.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(rows)
    }

    async fn list_categories_with_tests(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut rows: Vec<Category> = state
            .categories
            .values()
            .filter(|c| state.tests.values().any(|t| t.category_id == c.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(rows)
    }

    async fn count_tests_by_category(&self) -> Result<Vec<(Uuid, i64)>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .keys()
            .map(|id| {
                let count = state.tests.values().filter(|t| t.category_id == *id).count();
                (*id, count as i64)
            })
            .collect())
    }
}

#[async_trait]
impl TestRepository for MemoryStore {
    async fn insert_test(&self, new: &NewTest) -> Result<Test> {
        let mut state = self.state.write().await;
        if !state.categories.contains_key(&new.category_id) {
            return Err(missing("Category", new.category_id));
        }
        if !state.users.contains_key(&new.author_id) {
            return Err(missing("User", new.author_id));
        }
        if state.test_title_taken(new.category_id, &new.title, None) {
            return Err(Error::taken("title"));
        }
        let at = self.clock.now();
        let test = Test {
            id: Uuid::new_v4(),
            category_id: new.category_id,
            author_id: new.author_id,
            title: new.title.clone(),
            level: new.level,
            description: new.description.clone(),
            time_limit: new.time_limit,
            passing_score: new.passing_score,
            published: new.published,
            created_at: at,
            updated_at: at,
        };
        state.tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn update_test(&self, test: &Test) -> Result<Test> {
        let mut state = self.state.write().await;
        if !state.tests.contains_key(&test.id) {
            return Err(missing("Test", test.id));
        }
        if !state.categories.contains_key(&test.category_id) {
            return Err(missing("Category", test.category_id));
        }
        if state.test_title_taken(test.category_id, &test.title, Some(test.id)) {
            return Err(Error::taken("title"));
        }
        let mut updated = test.clone();
        updated.updated_at = self.clock.now();
        state.tests.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<Test>> {
        Ok(self.state.read().await.tests.get(&id).cloned())
    }

    async fn find_test_by_title(&self, category_id: Uuid, title: &str) -> Result<Option<Test>> {
        let state = self.state.read().await;
        Ok(state
            .tests
            .values()
            .find(|t| t.category_id == category_id && t.title == title)
            .cloned())
    }

    async fn delete_test(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.remove_test_tree(id))
    }

    async fn list_tests(&self, filter: &TestFilter) -> Result<Vec<Test>> {
        let state = self.state.read().await;
        let mut rows: Vec<Test> = state
            .tests
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(rows)
    }

    async fn recent_tests(&self, limit: i64) -> Result<Vec<Test>> {
        let state = self.state.read().await;
        let mut rows: Vec<Test> = state.tests.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn count_tests(&self, category_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .tests
            .values()
            .filter(|t| t.category_id == category_id)
            .count() as i64)
    }

    async fn titles_by_category(&self, category_title: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut titles: Vec<String> = state
            .tests
            .values()
            .filter(|t| {
                state
                    .categories
                    .get(&t.category_id)
                    .map_or(false, |c| c.title == category_title)
            })
            .map(|t| t.title.clone())
            .collect();
        titles.sort_by(|a, b| b.cmp(a));
        Ok(titles)
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn insert_question(&self, new: &NewQuestion) -> Result<Question> {
        let mut state = self.state.write().await;
        if !state.tests.contains_key(&new.test_id) {
            return Err(missing("Test", new.test_id));
        }
        if state.position_taken(new.test_id, new.position, None) {
            return Err(Error::taken("position"));
        }
        let at = self.clock.now();
        let question = Question {
            id: Uuid::new_v4(),
            test_id: new.test_id,
            body: new.body.clone(),
            position: new.position,
            question_type: new.question_type,
            points: new.points,
            created_at: at,
            updated_at: at,
        };
        state.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> Result<Question> {
        let mut state = self.state.write().await;
        if !state.questions.contains_key(&question.id) {
            return Err(missing("Question", question.id));
        }
        if state.position_taken(question.test_id, question.position, Some(question.id)) {
            return Err(Error::taken("position"));
        }
        let mut updated = question.clone();
        updated.updated_at = self.clock.now();
        state.questions.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>> {
        Ok(self.state.read().await.questions.get(&id).cloned())
    }

    async fn find_question_at(&self, test_id: Uuid, position: i32) -> Result<Option<Question>> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .values()
            .find(|q| q.test_id == test_id && q.position == position)
            .cloned())
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.remove_question_tree(id))
    }

    async fn list_questions(
        &self,
        test_id: Uuid,
        question_type: Option<QuestionType>,
    ) -> Result<Vec<Question>> {
        let state = self.state.read().await;
        let mut rows: Vec<Question> = state
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .filter(|q| question_type.map_or(true, |t| q.question_type == t))
            .cloned()
            .collect();
        rows.sort_by_key(|q| q.position);
        Ok(rows)
    }

    async fn count_questions(&self, test_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .count() as i64)
    }
}

#[async_trait]
impl AnswerRepository for MemoryStore {
    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer> {
        let mut state = self.state.write().await;
        if !state.questions.contains_key(&new.question_id) {
            return Err(missing("Question", new.question_id));
        }
        let at = self.clock.now();
        let answer = Answer {
            id: Uuid::new_v4(),
            question_id: new.question_id,
            body: new.body.clone(),
            is_correct: new.is_correct,
            position: new.position,
            created_at: at,
            updated_at: at,
        };
        state.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    async fn update_answer(&self, answer: &Answer) -> Result<Answer> {
        let mut state = self.state.write().await;
        if !state.answers.contains_key(&answer.id) {
            return Err(missing("Answer", answer.id));
        }
        let mut updated = answer.clone();
        updated.updated_at = self.clock.now();
        state.answers.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        Ok(self.state.read().await.answers.get(&id).cloned())
    }

    async fn delete_answer(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.answers.remove(&id).is_some())
    }

    async fn list_answers(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        let state = self.state.read().await;
        let mut rows: Vec<Answer> = state
            .answers
            .values()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rows)
    }
}

#[async_trait]
impl TestResultRepository for MemoryStore {
    async fn insert_result(&self, result: &TestResult) -> Result<TestResult> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&result.user_id) {
            return Err(missing("User", result.user_id));
        }
        if !state.tests.contains_key(&result.test_id) {
            return Err(missing("Test", result.test_id));
        }
        if state.results.contains_key(&result.id) {
            return Err(Error::taken("id"));
        }
        state.results.insert(result.id, result.clone());
        Ok(result.clone())
    }

    async fn update_result(
        &self,
        result: &TestResult,
        guard: ResultGuard,
    ) -> Result<Option<TestResult>> {
        let mut state = self.state.write().await;
        match state.results.get_mut(&result.id) {
            Some(stored) if guard.holds(stored) => {
                let mut updated = result.clone();
                updated.created_at = stored.created_at;
                *stored = updated.clone();
                Ok(Some(updated))
            }
            _ => Ok(None),
        }
    }

    async fn record_answer(&self, answer: &ResultAnswer) -> Result<Option<TestResult>> {
        let mut state = self.state.write().await;
        if !state.questions.contains_key(&answer.question_id) {
            return Err(missing("Question", answer.question_id));
        }
        match state.results.get(&answer.result_id) {
            Some(stored) if stored.status == AttemptStatus::InProgress => {}
            _ => return Ok(None),
        }
        let key = (answer.result_id, answer.question_id);
        if state.result_answers.contains_key(&key) {
            return Err(Error::taken("question_id"));
        }

        let Some(stored) = state.results.get_mut(&answer.result_id) else {
            return Ok(None);
        };
        if answer.is_correct == Some(true) {
            if stored.correct_answers >= stored.total_questions {
                return Err(Error::invalid(
                    "correct_answers",
                    "exceeds_total",
                    "must be less than or equal to total_questions",
                ));
            }
            stored.correct_answers += 1;
        }
        stored.updated_at = answer.created_at;
        let updated = stored.clone();
        state.result_answers.insert(key, answer.clone());
        Ok(Some(updated))
    }

    async fn list_result_answers(&self, result_id: Uuid) -> Result<Vec<ResultAnswer>> {
        let state = self.state.read().await;
        let mut rows: Vec<ResultAnswer> = state
            .result_answers
            .values()
            .filter(|a| a.result_id == result_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn find_result(&self, id: Uuid) -> Result<Option<TestResult>> {
        Ok(self.state.read().await.results.get(&id).cloned())
    }

    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<TestResult>> {
        let state = self.state.read().await;
        let mut rows: Vec<TestResult> = state
            .results
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn average_score(&self, test_id: Uuid) -> Result<Option<Decimal>> {
        let state = self.state.read().await;
        let scores: Vec<Decimal> = state
            .results
            .values()
            .filter(|r| r.test_id == test_id && r.status == AttemptStatus::Completed)
            .map(|r| r.score)
            .collect();
        if scores.is_empty() {
            return Ok(None);
        }
        let total: Decimal = scores.iter().copied().sum();
        Ok(Some(total / Decimal::from(scores.len() as i64)))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, new: &NewUser) -> Result<User> {
        let mut state = self.state.write().await;
        if state.email_taken(&new.email, None) {
            return Err(Error::taken("email"));
        }
        let at = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(&new.email),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            role: new.role,
            created_at: at,
            updated_at: at,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user.id) {
            return Err(missing("User", user.id));
        }
        if state.email_taken(&user.email, Some(user.id)) {
            return Err(Error::taken("email"));
        }
        let mut updated = user.clone();
        updated.email = normalize_email(&user.email);
        updated.updated_at = self.clock.now();
        state.users.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, role: Option<UserRole>) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut rows: Vec<User> = state
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(rows)
    }

    async fn list_user_tests(&self, user_id: Uuid, level: Option<i32>) -> Result<Vec<Test>> {
        let state = self.state.read().await;
        let mut rows: Vec<Test> = state
            .tests
            .values()
            .filter(|t| level.map_or(true, |l| t.level == l))
            .filter(|t| {
                state
                    .results
                    .values()
                    .any(|r| r.user_id == user_id && r.test_id == t.id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(rows)
    }
}
