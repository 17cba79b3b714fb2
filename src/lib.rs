pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{Config, DEFAULT_PASSING_SCORE};
use crate::database::{MemoryStore, PgStore, Repository};
use crate::services::{
    answer_service::AnswerService, attempt_service::AttemptService,
    category_service::CategoryService, question_service::QuestionService,
    test_service::TestService, user_service::UserService,
};
use crate::utils::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Repository>,
    pub category_service: CategoryService,
    pub test_service: TestService,
    pub question_service: QuestionService,
    pub answer_service: AnswerService,
    pub user_service: UserService,
    pub attempt_service: AttemptService,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self::with_store(
            Arc::new(PgStore::new(pool)),
            Arc::new(SystemClock),
            config.default_passing_score,
        )
    }

    pub fn with_store(
        store: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        default_passing_score: i32,
    ) -> Self {
        Self {
            category_service: CategoryService::new(store.clone()),
            test_service: TestService::new(store.clone()),
            question_service: QuestionService::new(store.clone()),
            answer_service: AnswerService::new(store.clone()),
            user_service: UserService::new(store.clone()),
            attempt_service: AttemptService::new(store.clone(), clock)
                .with_default_passing_score(default_passing_score),
            store,
        }
    }

    /// Backed by [`MemoryStore`] and the system clock.
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_store(
            Arc::new(MemoryStore::with_clock(clock.clone())),
            clock,
            DEFAULT_PASSING_SCORE,
        )
    }
}
