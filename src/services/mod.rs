pub mod answer_service;
pub mod attempt_service;
pub mod category_service;
pub mod grading_service;
pub mod question_service;
pub mod test_service;
pub mod user_service;
