use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
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
use crate::models::test_result::{ResultAnswer, ResultFilter, ResultGuard, TestResult};
use crate::models::user::{normalize_email, NewUser, User, UserRole};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn insert_category(&self, new: &NewCategory) -> Result<Category> {
        let category = sqlx::query_as::<_, Category>(
            r#"INSERT INTO categories (title, description) VALUES ($1, $2) RETURNING *"#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<Category> {
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET title = $1, description = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(&category.title)
        .bind(&category.description)
        .bind(category.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(r#"SELECT * FROM categories WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            r#"SELECT * FROM categories WHERE LOWER(title) = LOWER($1)"#,
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM categories WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    Error::DeleteRestricted(format!(
                        "Category {} still has tests and cannot be deleted",
                        id
                    ))
                }
                other => Error::from(other),
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(r#"SELECT * FROM categories ORDER BY title ASC"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_categories_with_tests(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.* FROM categories c
            WHERE EXISTS (SELECT 1 FROM tests t WHERE t.category_id = c.id)
            ORDER BY c.title ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_tests_by_category(&self) -> Result<Vec<(Uuid, i64)>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT c.id, COUNT(t.id) AS tests_count
            FROM categories c
            LEFT JOIN tests t ON t.category_id = c.id
            GROUP BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TestRepository for PgStore {
    async fn insert_test(&self, new: &NewTest) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (
                category_id, author_id, title, level, description,
                time_limit, passing_score, published
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.category_id)
        .bind(new.author_id)
        .bind(&new.title)
        .bind(new.level)
        .bind(&new.description)
        .bind(new.time_limit)
        .bind(new.passing_score)
        .bind(new.published)
        .fetch_one(&self.pool)
        .await?;
        Ok(test)
    }

    async fn update_test(&self, test: &Test) -> Result<Test> {
        let updated = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests
            SET
                category_id = $1,
                title = $2,
                level = $3,
                description = $4,
                time_limit = $5,
                passing_score = $6,
                published = $7,
                updated_at = NOW()
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(test.category_id)
        .bind(&test.title)
        .bind(test.level)
        .bind(&test.description)
        .bind(test.time_limit)
        .bind(test.passing_score)
        .bind(test.published)
        .bind(test.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(test)
    }

    async fn find_test_by_title(&self, category_id: Uuid, title: &str) -> Result<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(
            r#"SELECT * FROM tests WHERE category_id = $1 AND title = $2"#,
        )
        .bind(category_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(test)
    }

    async fn delete_test(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM tests WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tests(&self, filter: &TestFilter) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, Test>(
            r#"
            SELECT * FROM tests
            WHERE ($1::bool IS NULL OR published = $1)
              AND ($2::int IS NULL OR level = $2)
              AND ($3::uuid IS NULL OR category_id = $3)
            ORDER BY title ASC
            "#,
        )
        .bind(filter.published)
        .bind(filter.level)
        .bind(filter.category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_tests(&self, limit: i64) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, Test>(
            r#"SELECT * FROM tests ORDER BY created_at DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_tests(&self, category_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM tests WHERE category_id = $1"#)
                .bind(category_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn titles_by_category(&self, category_title: &str) -> Result<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.title FROM tests t
            JOIN categories c ON c.id = t.category_id
            WHERE c.title = $1
            ORDER BY t.title DESC
            "#,
        )
        .bind(category_title)
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn insert_question(&self, new: &NewQuestion) -> Result<Question> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (test_id, body, position, question_type, points)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.test_id)
        .bind(&new.body)
        .bind(new.position)
        .bind(new.question_type.as_str())
        .bind(new.points)
        .fetch_one(&self.pool)
        .await?;
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> Result<Question> {
        let updated = sqlx::query_as::<_, Question>(
            r#"
            UPDATE questions
            SET body = $1, position = $2, question_type = $3, points = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&question.body)
        .bind(question.position)
        .bind(question.question_type.as_str())
        .bind(question.points)
        .bind(question.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(r#"SELECT * FROM questions WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(question)
    }

    async fn find_question_at(&self, test_id: Uuid, position: i32) -> Result<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE test_id = $1 AND position = $2"#,
        )
        .bind(test_id)
        .bind(position)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM questions WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_questions(
        &self,
        test_id: Uuid,
        question_type: Option<QuestionType>,
    ) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"
            SELECT * FROM questions
            WHERE test_id = $1
              AND ($2::text IS NULL OR question_type = $2)
            ORDER BY position ASC
            "#,
        )
        .bind(test_id)
        .bind(question_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_questions(&self, test_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM questions WHERE test_id = $1"#)
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AnswerRepository for PgStore {
    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer> {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (question_id, body, is_correct, position)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.question_id)
        .bind(&new.body)
        .bind(new.is_correct)
        .bind(new.position)
        .fetch_one(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn update_answer(&self, answer: &Answer) -> Result<Answer> {
        let updated = sqlx::query_as::<_, Answer>(
            r#"
            UPDATE answers
            SET body = $1, is_correct = $2, position = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(&answer.body)
        .bind(answer.is_correct)
        .bind(answer.position)
        .bind(answer.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        let answer = sqlx::query_as::<_, Answer>(r#"SELECT * FROM answers WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(answer)
    }

    async fn delete_answer(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM answers WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_answers(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE question_id = $1 ORDER BY position ASC, created_at ASC"#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TestResultRepository for PgStore {
    async fn insert_result(&self, result: &TestResult) -> Result<TestResult> {
        let inserted = sqlx::query_as::<_, TestResult>(
            r#"
            INSERT INTO test_results (
                id, user_id, test_id, score, correct_answers, total_questions,
                status, started_at, completed_at, time_spent, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(result.id)
        .bind(result.user_id)
        .bind(result.test_id)
        .bind(result.score)
        .bind(result.correct_answers)
        .bind(result.total_questions)
        .bind(result.status.as_str())
        .bind(result.started_at)
        .bind(result.completed_at)
        .bind(result.time_spent)
        .bind(result.created_at)
        .bind(result.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update_result(
        &self,
        result: &TestResult,
        guard: ResultGuard,
    ) -> Result<Option<TestResult>> {
        let updated = sqlx::query_as::<_, TestResult>(
            r#"
            UPDATE test_results
            SET score = $1,
                correct_answers = $2,
                total_questions = $3,
                status = $4,
                completed_at = $5,
                time_spent = $6,
                updated_at = $7
            WHERE id = $8 AND status = $9 AND correct_answers = $10
            RETURNING *
            "#,
        )
        .bind(result.score)
        .bind(result.correct_answers)
        .bind(result.total_questions)
        .bind(result.status.as_str())
        .bind(result.completed_at)
        .bind(result.time_spent)
        .bind(result.updated_at)
        .bind(result.id)
        .bind(guard.status.as_str())
        .bind(guard.correct_answers)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn record_answer(&self, answer: &ResultAnswer) -> Result<Option<TestResult>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, TestResult>(
            r#"
            UPDATE test_results
            SET correct_answers = correct_answers + CASE WHEN $2 THEN 1 ELSE 0 END,
                updated_at = $3
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(answer.result_id)
        .bind(answer.is_correct == Some(true))
        .bind(answer.created_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(updated) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO test_result_answers (
                result_id, question_id, selected_answer_ids, is_correct, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(answer.result_id)
        .bind(answer.question_id)
        .bind(&answer.selected_answer_ids)
        .bind(answer.is_correct)
        .bind(answer.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn list_result_answers(&self, result_id: Uuid) -> Result<Vec<ResultAnswer>> {
        let rows = sqlx::query_as::<_, ResultAnswer>(
            r#"SELECT * FROM test_result_answers WHERE result_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_result(&self, id: Uuid) -> Result<Option<TestResult>> {
        let result = sqlx::query_as::<_, TestResult>(r#"SELECT * FROM test_results WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(result)
    }

    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<TestResult>> {
        let rows = sqlx::query_as::<_, TestResult>(
            r#"
            SELECT * FROM test_results
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR test_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.test_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn average_score(&self, test_id: Uuid) -> Result<Option<Decimal>> {
        let average: Option<Decimal> = sqlx::query_scalar(
            r#"SELECT AVG(score) FROM test_results WHERE test_id = $1 AND status = 'completed'"#,
        )
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(average)
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, new: &NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(normalize_email(&new.email))
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $1, first_name = $2, last_name = $3, role = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(normalize_email(&user.email))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE LOWER(email) = LOWER($1)"#)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, role: Option<UserRole>) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"SELECT * FROM users WHERE ($1::text IS NULL OR role = $1) ORDER BY email ASC"#,
        )
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_user_tests(&self, user_id: Uuid, level: Option<i32>) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, Test>(
            r#"
            SELECT DISTINCT t.* FROM tests t
            JOIN test_results r ON r.test_id = t.id
            WHERE r.user_id = $1
              AND ($2::int IS NULL OR t.level = $2)
            ORDER BY t.title ASC
            "#,
        )
        .bind(user_id)
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
