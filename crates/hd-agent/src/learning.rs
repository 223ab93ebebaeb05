//! Feedback-driven adaptation of per-category confidence thresholds.
//!
//! A wrong category raises that category's threshold by [`INCREASE_ON_WRONG`];
//! a correct one lowers it by [`DECREASE_ON_CORRECT`]. The result always stays
//! within [`MIN_THRESHOLD`, `MAX_THRESHOLD`].

use std::sync::Arc;

use hd_core::store::TicketStore;
use hd_core::types::{CategoryPolicyParameter, FeedbackEntry, TicketCategory};

use crate::error::Result;

pub const MIN_THRESHOLD: f64 = 0.30;
pub const MAX_THRESHOLD: f64 = 0.95;
pub const DECREASE_ON_CORRECT: f64 = 0.02;
pub const INCREASE_ON_WRONG: f64 = 0.05;

/// Next threshold after one piece of feedback, clamped and rounded to 4 decimals.
pub fn adjust_threshold(current: f64, was_correct: bool) -> f64 {
    let next = if was_correct {
        current - DECREASE_ON_CORRECT
    } else {
        current + INCREASE_ON_WRONG
    };
    round4(next.clamp(MIN_THRESHOLD, MAX_THRESHOLD))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Apply one feedback outcome to a policy row's counters and threshold.
pub fn apply_feedback(row: &mut CategoryPolicyParameter, was_correct: bool) {
    row.total_feedback_count += 1;
    if was_correct {
        row.correct_count += 1;
    } else {
        row.incorrect_count += 1;
    }
    row.confidence_threshold = adjust_threshold(row.confidence_threshold, was_correct);
}

pub struct LearningEngine {
    store: Arc<dyn TicketStore>,
}

impl LearningEngine {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Update the policy row for the category the agent originally chose.
    ///
    /// The row is created on first feedback, seeded from the global threshold.
    pub async fn learn_from_feedback(
        &self,
        feedback: &FeedbackEntry,
    ) -> Result<CategoryPolicyParameter> {
        let seed = self.store.get_settings().await?.confidence_threshold;
        let was_correct = feedback.was_category_correct;
        let row = self
            .store
            .modify_policy_parameter(
                feedback.original_category,
                seed,
                Box::new(move |row| apply_feedback(row, was_correct)),
            )
            .await?;

        tracing::info!(
            category = %row.category,
            was_correct,
            threshold = row.confidence_threshold,
            total = row.total_feedback_count,
            "policy threshold adjusted"
        );
        Ok(row)
    }

    /// The category's learned threshold, or the global one if it has no feedback yet.
    pub async fn effective_threshold(&self, category: TicketCategory) -> Result<f64> {
        if let Some(row) = self.store.get_policy_parameter(category).await? {
            return Ok(row.confidence_threshold);
        }
        Ok(self.store.get_settings().await?.confidence_threshold)
    }

    pub async fn all_policy_parameters(&self) -> Result<Vec<CategoryPolicyParameter>> {
        Ok(self.store.list_policy_parameters().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn wrong_feedback_raises_threshold() {
        assert_eq!(adjust_threshold(0.7, false), 0.75);
        assert_eq!(adjust_threshold(0.75, false), 0.8);
        assert_eq!(adjust_threshold(0.93, false), MAX_THRESHOLD);
        assert_eq!(adjust_threshold(MAX_THRESHOLD, false), MAX_THRESHOLD);
    }

    #[test]
    fn correct_feedback_lowers_threshold() {
        assert_eq!(adjust_threshold(0.7, true), 0.68);
        assert_eq!(adjust_threshold(0.31, true), MIN_THRESHOLD);
        assert_eq!(adjust_threshold(MIN_THRESHOLD, true), MIN_THRESHOLD);
    }

    #[test]
    fn out_of_range_seed_is_pulled_into_bounds() {
        assert_eq!(adjust_threshold(0.1, false), MIN_THRESHOLD);
        assert_eq!(adjust_threshold(1.0, true), MAX_THRESHOLD);
    }

    #[test]
    fn long_histories_do_not_drift() {
        let mut t = 0.7;
        for _ in 0..50 {
            t = adjust_threshold(t, true);
            t = adjust_threshold(t, false);
        }
        // Each round nets +0.03 until the ceiling.
        assert_eq!(t, MAX_THRESHOLD);
        assert_eq!(t, round4(t));
    }

    #[test]
    fn apply_feedback_counts() {
        let mut row = CategoryPolicyParameter::seeded(TicketCategory::Billing, 0.7, Utc::now());
        apply_feedback(&mut row, true);
        apply_feedback(&mut row, false);
        apply_feedback(&mut row, false);
        assert_eq!(row.total_feedback_count, 3);
        assert_eq!(row.correct_count, 1);
        assert_eq!(row.incorrect_count, 2);
        assert_eq!(row.confidence_threshold, 0.78);
    }
}
