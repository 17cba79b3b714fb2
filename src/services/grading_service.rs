use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::QuestionType;

pub struct GradingService;

impl GradingService {
    /// Percentage of correct answers, rounded half-up to two places.
    ///
    /// Question points are not weighted in.
    pub fn score(correct_answers: i32, total_questions: i32) -> Decimal {
        if total_questions == 0 {
            return Decimal::new(0, 2);
        }

        let mut score = (Decimal::from(correct_answers) * Decimal::ONE_HUNDRED
            / Decimal::from(total_questions))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        score.rescale(2);
        score
    }

    /// Inclusive: a score equal to the threshold passes.
    pub fn passes(score: Decimal, passing_score: i32) -> bool {
        score >= Decimal::from(passing_score)
    }

    /// Whether `selected` is a correct response to a question with `answers`.
    ///
    /// `None` for text questions, which are not auto-graded. Single choice
    /// needs exactly the one correct answer picked; multiple choice needs the
    /// picked set to equal the correct set.
    pub fn evaluate_selection(
        question_type: QuestionType,
        answers: &[Answer],
        selected: &[Uuid],
    ) -> Result<Option<bool>> {
        if !question_type.is_choice() {
            return Ok(None);
        }

        let selected: HashSet<Uuid> = selected.iter().copied().collect();
        if let Some(unknown) = selected
            .iter()
            .find(|id| !answers.iter().any(|a| a.id == **id))
        {
            return Err(Error::invalid(
                "selected_answer_ids",
                "unknown_answer",
                format!("Answer {} does not belong to this question", unknown),
            ));
        }

        let correct: HashSet<Uuid> = answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.id)
            .collect();
        if correct.is_empty() {
            return Ok(Some(false));
        }

        let is_correct = match question_type {
            QuestionType::SingleChoice => {
                selected.len() == 1 && selected.iter().all(|id| correct.contains(id))
            }
            _ => selected == correct,
        };
        Ok(Some(is_correct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn answers(correct: &[bool]) -> Vec<Answer> {
        let now = Utc::now();
        correct
            .iter()
            .enumerate()
            .map(|(idx, is_correct)| Answer {
                id: Uuid::new_v4(),
                question_id: Uuid::nil(),
                body: format!("Option {}", idx + 1),
                is_correct: *is_correct,
                position: idx as i32 + 1,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    #[test]
    fn score_examples() {
        assert_eq!(GradingService::score(0, 10), Decimal::ZERO);
        assert_eq!(GradingService::score(10, 10), Decimal::ONE_HUNDRED);
        assert_eq!(GradingService::score(1, 3), Decimal::new(3333, 2));
        assert_eq!(GradingService::score(0, 0), Decimal::ZERO);
        assert_eq!(GradingService::score(2, 3), Decimal::new(6667, 2));
    }

    #[test]
    fn score_has_two_decimal_places() {
        assert_eq!(GradingService::score(10, 10).to_string(), "100.00");
        assert_eq!(GradingService::score(1, 8).to_string(), "12.50");
    }

    #[test]
    fn midpoint_rounds_up() {
        // 1/800 = 0.125%
        assert_eq!(GradingService::score(1, 800), Decimal::new(13, 2));
        // 1/1600 = 0.0625% -> 0.06
        assert_eq!(GradingService::score(1, 1600), Decimal::new(6, 2));
    }

    #[test]
    fn passing_is_inclusive() {
        assert!(GradingService::passes(Decimal::new(7000, 2), 70));
        assert!(!GradingService::passes(Decimal::new(6999, 2), 70));
        assert!(GradingService::passes(Decimal::ZERO, 0));
    }

    #[test]
    fn single_choice_needs_exactly_the_correct_answer() {
        let a = answers(&[false, true, false, false]);
        let pick = |ids: &[Uuid]| {
            GradingService::evaluate_selection(QuestionType::SingleChoice, &a, ids).unwrap()
        };
        assert_eq!(pick(&[a[1].id]), Some(true));
        assert_eq!(pick(&[a[0].id]), Some(false));
        assert_eq!(pick(&[a[0].id, a[1].id]), Some(false));
        assert_eq!(pick(&[]), Some(false));
    }

    #[test]
    fn multiple_choice_needs_the_full_correct_set() {
        let a = answers(&[true, false, true]);
        let pick = |ids: &[Uuid]| {
            GradingService::evaluate_selection(QuestionType::MultipleChoice, &a, ids).unwrap()
        };
        assert_eq!(pick(&[a[0].id, a[2].id]), Some(true));
        assert_eq!(pick(&[a[2].id, a[0].id, a[0].id]), Some(true));
        assert_eq!(pick(&[a[0].id]), Some(false));
        assert_eq!(pick(&[a[0].id, a[1].id, a[2].id]), Some(false));
    }

    #[test]
    fn text_questions_are_not_graded() {
        let a = answers(&[true]);
        assert_eq!(
            GradingService::evaluate_selection(QuestionType::Text, &a, &[a[0].id]).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_answer_ids_are_rejected() {
        let a = answers(&[true, false]);
        let err = GradingService::evaluate_selection(
            QuestionType::SingleChoice,
            &a,
            &[Uuid::new_v4()],
        )
        .unwrap_err();
        assert!(err.is_invalid("selected_answer_ids"));
    }
}
