use std::sync::Arc;

use hd_core::clock::Clock;
use hd_core::store::TicketStore;
use hd_core::types::{FeedbackEntry, TicketCategory, TicketPriority};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::learning::LearningEngine;

/// Records human corrections and feeds them to the learning engine.
pub struct FeedbackService {
    store: Arc<dyn TicketStore>,
    learning: LearningEngine,
    clock: Arc<dyn Clock>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            learning: LearningEngine::new(Arc::clone(&store)),
            store,
            clock,
        }
    }

    /// Compare the ticket's current classification with the reviewer's,
    /// persist the entry, learn from it, then apply the correction if needed.
    ///
    /// A ticket that was never classified is compared as `Other` / `Medium`.
    pub async fn submit_feedback(
        &self,
        ticket_id: Uuid,
        correct_category: TicketCategory,
        correct_priority: TicketPriority,
        note: Option<String>,
    ) -> Result<FeedbackEntry> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(AgentError::TicketNotFound(ticket_id))?;

        let original_category = ticket.category.unwrap_or(TicketCategory::Other);
        let original_priority = ticket.priority.unwrap_or(TicketPriority::Medium);

        let entry = FeedbackEntry {
            id: Uuid::new_v4(),
            ticket_id,
            timestamp: self.clock.now(),
            original_category,
            original_priority,
            correct_category,
            correct_priority,
            was_category_correct: original_category == correct_category,
            was_priority_correct: original_priority == correct_priority,
            note,
        };

        self.store.append_feedback(&entry).await?;
        self.learning.learn_from_feedback(&entry).await?;

        if !entry.was_category_correct || !entry.was_priority_correct {
            self.store
                .apply_correction(ticket_id, correct_category, correct_priority)
                .await?;
        }

        tracing::info!(
            ticket_id = %ticket_id,
            original_category = %original_category,
            correct_category = %correct_category,
            category_correct = entry.was_category_correct,
            priority_correct = entry.was_priority_correct,
            "feedback recorded"
        );
        Ok(entry)
    }

    pub fn learning(&self) -> &LearningEngine {
        &self.learning
    }
}
