use hd_core::types::{AgentDecision, AgentSettings, SupportTeam};

use crate::classifier::Classification;
use crate::router::Router;

/// The agent's choice for one ticket, with the data each outcome needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    AskForInfo { question: String },
    Review { reason: String },
    /// `team` is `None` only when the router could not resolve one.
    Assign { team: Option<SupportTeam> },
}

impl Decision {
    pub fn kind(&self) -> AgentDecision {
        match self {
            Decision::AskForInfo { .. } => AgentDecision::AskedForInfo,
            Decision::Review { .. } => AgentDecision::SentToReview,
            Decision::Assign { .. } => AgentDecision::AutoAssigned,
        }
    }
}

pub const ROUTING_FAILED_REASON: &str = "Routing failed (team was null). Sent to review.";

pub fn clarifying_question(missing_fields: &[String]) -> String {
    format!(
        "Please provide additional information: {}",
        missing_fields.join(", ")
    )
}

/// Pure decision policy, evaluated in order:
/// missing fields, then confidence against `threshold`, then auto-assign.
pub fn decide(
    classification: &Classification,
    settings: &AgentSettings,
    threshold: f64,
    router: &dyn Router,
) -> Decision {
    if !classification.missing_fields.is_empty() {
        if settings.enable_auto_ask_clarifying_questions {
            return Decision::AskForInfo {
                question: clarifying_question(&classification.missing_fields),
            };
        }
        return Decision::Review {
            reason: format!(
                "Missing required fields ({}) and auto-ask is disabled.",
                classification.missing_fields.join(", ")
            ),
        };
    }

    if classification.confidence < threshold {
        return Decision::Review {
            reason: format!(
                "Low confidence ({:.2} < {:.2}).",
                classification.confidence, threshold
            ),
        };
    }

    if settings.enable_auto_assign {
        return Decision::Assign {
            team: router.route(classification.category),
        };
    }

    Decision::Review {
        reason: "Auto-assign is disabled.".to_string(),
    }
}
