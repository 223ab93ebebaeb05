//! The sense/think/act step.
//!
//! One call to [`TicketAgent::step`] claims at most one ticket, classifies it,
//! picks a decision and persists it as a status change plus one event.

use std::sync::Arc;

use async_trait::async_trait;
use hd_core::store::{Assignment, TicketStore};
use hd_core::types::{
    AgentDecision, SupportTeam, TicketCategory, TicketPriority, TicketStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::{Classifier, KeywordClassifier};
use crate::error::Result;
use crate::learning::LearningEngine;
use crate::policy::{decide, Decision, ROUTING_FAILED_REASON};
use crate::router::{DefaultRouter, Router};

/// What one tick did, for logs and callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    pub ticket_id: Uuid,
    pub decision: AgentDecision,
    pub new_status: TicketStatus,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub team: Option<SupportTeam>,
    pub confidence: f64,
    /// The effective threshold the confidence was compared against.
    pub threshold: f64,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

/// Anything that can run one agent tick. The driving loop only sees this.
#[async_trait]
pub trait AgentStep: Send + Sync {
    /// `Ok(None)` means the queue had no work.
    async fn step(&self) -> Result<Option<TickResult>>;
}

pub struct TicketAgent {
    store: Arc<dyn TicketStore>,
    classifier: Arc<dyn Classifier>,
    router: Arc<dyn Router>,
    learning: LearningEngine,
}

impl TicketAgent {
    /// Agent with the keyword classifier and the default router.
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self {
            learning: LearningEngine::new(Arc::clone(&store)),
            store,
            classifier: Arc::new(KeywordClassifier),
            router: Arc::new(DefaultRouter),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = router;
        self
    }

    pub async fn step(&self) -> Result<Option<TickResult>> {
        // Sense
        let Some(ticket) = self.store.claim_next_queued().await? else {
            return Ok(None);
        };

        // Think
        let settings = self.store.get_settings().await?;
        let classification = self.classifier.classify(&ticket, &settings);
        let threshold = self
            .learning
            .effective_threshold(classification.category)
            .await?;
        let decision = decide(&classification, &settings, threshold, self.router.as_ref());

        tracing::debug!(
            ticket_id = %ticket.id,
            category = %classification.category,
            priority = %classification.priority,
            confidence = classification.confidence,
            threshold,
            decision = %decision.kind(),
            "ticket classified"
        );

        // Act
        let explanation = Some(classification.explanation.as_str());
        let (decision, new_status, team) = match decision {
            Decision::AskForInfo { question } => {
                self.store
                    .mark_waiting_for_user(
                        ticket.id,
                        &question,
                        &classification.missing_fields,
                        explanation,
                    )
                    .await?;
                (AgentDecision::AskedForInfo, TicketStatus::WaitingForUser, None)
            }
            Decision::Assign { team: Some(team) } => {
                let assignment = Assignment {
                    team,
                    category: classification.category,
                    priority: classification.priority,
                    confidence: classification.confidence,
                };
                self.store
                    .mark_assigned(ticket.id, &assignment, explanation)
                    .await?;
                (AgentDecision::AutoAssigned, TicketStatus::Assigned, Some(team))
            }
            Decision::Assign { team: None } => {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    category = %classification.category,
                    "no team resolved, sending to review"
                );
                self.store
                    .mark_needs_review(ticket.id, ROUTING_FAILED_REASON, explanation)
                    .await?;
                (AgentDecision::SentToReview, TicketStatus::NeedsReview, None)
            }
            Decision::Review { reason } => {
                self.store
                    .mark_needs_review(ticket.id, &reason, explanation)
                    .await?;
                (AgentDecision::SentToReview, TicketStatus::NeedsReview, None)
            }
        };

        Ok(Some(TickResult {
            ticket_id: ticket.id,
            decision,
            new_status,
            category: classification.category,
            priority: classification.priority,
            team,
            confidence: classification.confidence,
            threshold,
            explanation: classification.explanation,
            missing_fields: classification.missing_fields,
        }))
    }
}

#[async_trait]
impl AgentStep for TicketAgent {
    async fn step(&self) -> Result<Option<TickResult>> {
        TicketAgent::step(self).await
    }
}
