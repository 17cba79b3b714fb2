use std::env;

use assessment_engine::config::Config;
use assessment_engine::database::pool::{create_pool, run_migrations};
use assessment_engine::error::Error;
use assessment_engine::models::answer::NewAnswer;
use assessment_engine::models::category::NewCategory;
use assessment_engine::models::question::{NewQuestion, QuestionType};
use assessment_engine::models::test::NewTest;
use assessment_engine::models::test_result::AttemptStatus;
use assessment_engine::models::user::{NewUser, UserRole};
use assessment_engine::AppState;
use uuid::Uuid;

/// Runs against a real database when `DATABASE_URL` is set; otherwise skips.
#[tokio::test]
async fn postgres_round_trip() {
    dotenvy::dotenv().ok();
    let Ok(url) = env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let config = Config::new(url);
    let pool = create_pool(&config).await.expect("pool");
    run_migrations(&pool).await.expect("migrations");
    let state = AppState::new(pool.clone(), &config);

    let tag = Uuid::new_v4().simple().to_string();
    let user = state
        .user_service
        .create_user(NewUser {
            email: format!("pg_{}@example.com", tag),
            first_name: Some("Round".into()),
            last_name: Some("Trip".into()),
            role: UserRole::Student,
        })
        .await
        .expect("user");
    let category = state
        .category_service
        .create_category(NewCategory {
            title: format!("Programming {}", &tag[..8]),
            description: None,
        })
        .await
        .expect("category");
    let test = state
        .test_service
        .create_test(NewTest {
            category_id: category.id,
            author_id: user.id,
            title: "Basics".into(),
            level: 1,
            description: None,
            time_limit: None,
            passing_score: 70,
            published: true,
        })
        .await
        .expect("test");
    let question = state
        .question_service
        .create_question(NewQuestion {
            test_id: test.id,
            body: "Which keyword declares an immutable binding?".into(),
            position: 1,
            question_type: QuestionType::SingleChoice,
            points: 1,
        })
        .await
        .expect("question");
    let answer = state
        .answer_service
        .create_answer(NewAnswer {
            question_id: question.id,
            body: "let".into(),
            is_correct: true,
            position: 1,
        })
        .await
        .expect("answer");

    let attempt = state
        .attempt_service
        .start_attempt(user.id, test.id, 1)
        .await
        .expect("start");
    let submission = state
        .attempt_service
        .submit_answer(attempt.id, question.id, &[answer.id])
        .await
        .expect("submit");
    assert_eq!(submission.is_correct, Some(true));
    let err = state
        .attempt_service
        .submit_answer(attempt.id, question.id, &[answer.id])
        .await
        .expect_err("second submission");
    assert!(err.is_invalid("question_id"));
    let reloaded = state.attempt_service.get_result(attempt.id).await.expect("reload");
    assert_eq!(reloaded.correct_answers, 1);
    assert_eq!(
        state
            .attempt_service
            .list_submissions(attempt.id)
            .await
            .expect("submissions")
            .len(),
        1
    );

    let done = state.attempt_service.complete(attempt.id).await.expect("complete");
    assert_eq!(done.status, AttemptStatus::Completed);
    assert_eq!(done.score.to_string(), "100.00");
    assert!(matches!(
        state.attempt_service.complete(attempt.id).await,
        Err(Error::InvalidTransition { .. })
    ));

    assert!(matches!(
        state.category_service.delete_category(category.id).await,
        Err(Error::DeleteRestricted(_))
    ));
    state.test_service.delete_test(test.id).await.expect("delete test");
    state
        .category_service
        .delete_category(category.id)
        .await
        .expect("delete category");

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .expect("cleanup");
}
