//! Field rules run through `validator`; the rules that span more than one
//! field or entity live here as plain functions.

use std::borrow::Cow;

use rust_decimal::Decimal;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::answer::Answer;
use crate::models::question::QuestionType;
use crate::models::test_result::TestResult;

/// Key under which whole-record errors are reported.
pub const ENTITY: &str = "__all__";

/// When a rule that only applies to persisted records should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

pub fn validate<T: Validate>(val: &T) -> Result<(), ValidationErrors> {
    val.validate()
}

pub fn field_error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(field_error("blank", "can't be blank"));
    }
    Ok(())
}

/// A choice question that already has answers needs at least one correct one.
///
/// Only checked in [`ValidationMode::Update`]: a question is created before its
/// answers exist. `text` questions are exempt.
pub fn validate_question_answers(
    question_type: QuestionType,
    answers: &[Answer],
    mode: ValidationMode,
) -> Result<(), ValidationErrors> {
    if mode == ValidationMode::Create || answers.is_empty() || !question_type.is_choice() {
        return Ok(());
    }

    if answers.iter().any(|a| a.is_correct) {
        return Ok(());
    }

    let mut errors = ValidationErrors::new();
    errors.add(
        ENTITY,
        field_error(
            "no_correct_answer",
            "Question must have at least one correct answer",
        ),
    );
    Err(errors)
}

/// Checked on every write of an attempt.
pub fn validate_test_result(result: &TestResult) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if result.score < Decimal::ZERO || result.score > Decimal::ONE_HUNDRED {
        errors.add("score", field_error("range", "must be between 0 and 100"));
    } else if result.score.round_dp(2) != result.score {
        errors.add("score", field_error("precision", "must have at most two decimal places"));
    }

    if result.total_questions <= 0 {
        errors.add("total_questions", field_error("range", "must be greater than 0"));
    }

    if result.correct_answers < 0 {
        errors.add(
            "correct_answers",
            field_error("range", "must be greater than or equal to 0"),
        );
    } else if result.correct_answers > result.total_questions {
        errors.add(
            "correct_answers",
            field_error(
                "exceeds_total",
                "can't be greater than the total number of questions",
            ),
        );
    }

    if matches!(result.time_spent, Some(seconds) if seconds < 0) {
        errors.add(
            "time_spent",
            field_error("range", "must be greater than or equal to 0"),
        );
    }

    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_result::AttemptStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn answer(is_correct: bool) -> Answer {
        let now = Utc::now();
        Answer {
            id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            body: "An answer".to_string(),
            is_correct,
            position: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn result(correct: i32, total: i32) -> TestResult {
        let now = Utc::now();
        TestResult {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            score: Decimal::ZERO,
            correct_answers: correct,
            total_questions: total,
            status: AttemptStatus::InProgress,
            started_at: now,
            completed_at: None,
            time_spent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn choice_question_without_correct_answer_fails_on_update() {
        let answers = vec![answer(false), answer(false)];
        for kind in [QuestionType::SingleChoice, QuestionType::MultipleChoice] {
            let errors =
                validate_question_answers(kind, &answers, ValidationMode::Update).unwrap_err();
            assert!(errors.errors().contains_key(ENTITY));
        }
    }

    #[test]
    fn rule_skipped_on_create_for_text_and_without_answers() {
        let wrong = vec![answer(false)];
        assert!(validate_question_answers(
            QuestionType::SingleChoice,
            &wrong,
            ValidationMode::Create
        )
        .is_ok());
        assert!(
            validate_question_answers(QuestionType::Text, &wrong, ValidationMode::Update).is_ok()
        );
        assert!(validate_question_answers(
            QuestionType::MultipleChoice,
            &[],
            ValidationMode::Update
        )
        .is_ok());
    }

    #[test]
    fn one_correct_answer_is_enough() {
        let answers = vec![answer(false), answer(true), answer(false)];
        assert!(validate_question_answers(
            QuestionType::SingleChoice,
            &answers,
            ValidationMode::Update
        )
        .is_ok());
    }

    #[test]
    fn correct_answers_cannot_exceed_total() {
        let errors = validate_test_result(&result(4, 3)).unwrap_err();
        assert!(errors.errors().contains_key("correct_answers"));
        assert!(validate_test_result(&result(3, 3)).is_ok());
    }

    #[test]
    fn total_questions_must_be_positive() {
        let errors = validate_test_result(&result(0, 0)).unwrap_err();
        assert!(errors.errors().contains_key("total_questions"));
    }

    #[test]
    fn score_range_and_precision() {
        let mut r = result(1, 3);
        r.score = Decimal::new(10001, 2);
        assert!(validate_test_result(&r).is_err());
        r.score = Decimal::new(333333, 4);
        assert!(validate_test_result(&r).is_err());
        r.score = Decimal::new(3333, 2);
        assert!(validate_test_result(&r).is_ok());
    }

    #[test]
    fn blank_strings_rejected() {
        assert!(not_blank("   ").is_err());
        assert!(not_blank("Programming").is_ok());
    }
}
