use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enum <-> string codec
// ---------------------------------------------------------------------------

/// Returned when a persisted or user-supplied string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

fn parse_variant<T: Copy>(
    kind: &'static str,
    all: &[T],
    label: fn(&T) -> &'static str,
    raw: &str,
) -> Result<T, ParseEnumError> {
    let raw = raw.trim();
    all.iter()
        .copied()
        .find(|v| label(v).eq_ignore_ascii_case(raw))
        .ok_or_else(|| ParseEnumError {
            kind,
            value: raw.to_string(),
        })
}

// ---------------------------------------------------------------------------
// TicketStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Queued,
    Processing,
    WaitingForUser,
    NeedsReview,
    Assigned,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Queued,
        TicketStatus::Processing,
        TicketStatus::WaitingForUser,
        TicketStatus::NeedsReview,
        TicketStatus::Assigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Queued => "Queued",
            TicketStatus::Processing => "Processing",
            TicketStatus::WaitingForUser => "WaitingForUser",
            TicketStatus::NeedsReview => "NeedsReview",
            TicketStatus::Assigned => "Assigned",
        }
    }

    /// Returns `true` for the three states a tick can leave a ticket in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::WaitingForUser | TicketStatus::NeedsReview | TicketStatus::Assigned
        )
    }

    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Processing -> Queued` is only taken by the stale-ticket sweep.
    pub fn can_transition_to(&self, target: &TicketStatus) -> bool {
        matches!(
            (self, target),
            (TicketStatus::Queued, TicketStatus::Processing)
                | (TicketStatus::Processing, TicketStatus::WaitingForUser)
                | (TicketStatus::Processing, TicketStatus::NeedsReview)
                | (TicketStatus::Processing, TicketStatus::Assigned)
                | (TicketStatus::Processing, TicketStatus::Queued)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("ticket status", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// TicketCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketCategory {
    Account,
    Billing,
    Technical,
    Other,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 4] = [
        TicketCategory::Account,
        TicketCategory::Billing,
        TicketCategory::Technical,
        TicketCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Account => "Account",
            TicketCategory::Billing => "Billing",
            TicketCategory::Technical => "Technical",
            TicketCategory::Other => "Other",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("ticket category", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// TicketPriority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] = [
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "Low",
            TicketPriority::Medium => "Medium",
            TicketPriority::High => "High",
            TicketPriority::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("ticket priority", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// SupportTeam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportTeam {
    AccountsTeam,
    BillingTeam,
    TechTeam,
    GeneralSupport,
}

impl SupportTeam {
    pub const ALL: [SupportTeam; 4] = [
        SupportTeam::AccountsTeam,
        SupportTeam::BillingTeam,
        SupportTeam::TechTeam,
        SupportTeam::GeneralSupport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportTeam::AccountsTeam => "AccountsTeam",
            SupportTeam::BillingTeam => "BillingTeam",
            SupportTeam::TechTeam => "TechTeam",
            SupportTeam::GeneralSupport => "GeneralSupport",
        }
    }
}

impl fmt::Display for SupportTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportTeam {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("support team", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// AgentDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentDecision {
    AskedForInfo,
    SentToReview,
    AutoAssigned,
}

impl AgentDecision {
    pub const ALL: [AgentDecision; 3] = [
        AgentDecision::AskedForInfo,
        AgentDecision::SentToReview,
        AgentDecision::AutoAssigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentDecision::AskedForInfo => "AskedForInfo",
            AgentDecision::SentToReview => "SentToReview",
            AgentDecision::AutoAssigned => "AutoAssigned",
        }
    }
}

impl fmt::Display for AgentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentDecision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("agent decision", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// TicketEventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketEventKind {
    WaitingForUser,
    NeedsReview,
    Assigned,
}

impl TicketEventKind {
    pub const ALL: [TicketEventKind; 3] = [
        TicketEventKind::WaitingForUser,
        TicketEventKind::NeedsReview,
        TicketEventKind::Assigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketEventKind::WaitingForUser => "WaitingForUser",
            TicketEventKind::NeedsReview => "NeedsReview",
            TicketEventKind::Assigned => "Assigned",
        }
    }
}

impl fmt::Display for TicketEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketEventKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("ticket event kind", &Self::ALL, Self::as_str, s)
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub customer_id: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub category: Option<TicketCategory>,
    pub priority: Option<TicketPriority>,
    pub assigned_team: Option<SupportTeam>,
    pub confidence: Option<f64>,
    pub last_decision: Option<AgentDecision>,
    /// Comma-joined missing-field tags, e.g. `"error_details, steps_to_reproduce"`.
    pub missing_fields: Option<String>,
}

impl Ticket {
    /// A fresh `Queued` ticket stamped with `now`.
    pub fn new(
        customer_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            subject: subject.into(),
            body: body.into(),
            created_at: now,
            updated_at: now,
            status: TicketStatus::Queued,
            category: None,
            priority: None,
            assigned_team: None,
            confidence: None,
            last_decision: None,
            missing_fields: None,
        }
    }

    /// The missing-field tags as a list (trimmed, empties dropped).
    pub fn missing_field_list(&self) -> Vec<String> {
        self.missing_fields
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// TicketEvent
// ---------------------------------------------------------------------------

/// Append-only audit record written alongside every applied status decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: TicketEventKind,
    pub description: String,
    pub explanation: Option<String>,
}

// ---------------------------------------------------------------------------
// FeedbackEntry
// ---------------------------------------------------------------------------

/// Immutable record of one human correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The category the agent originally assigned.
    pub original_category: TicketCategory,
    pub original_priority: TicketPriority,
    /// The category according to the human reviewer.
    pub correct_category: TicketCategory,
    pub correct_priority: TicketPriority,
    pub was_category_correct: bool,
    pub was_priority_correct: bool,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// CategoryPolicyParameter
// ---------------------------------------------------------------------------

/// Per-category adaptive parameters adjusted by learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPolicyParameter {
    pub category: TicketCategory,
    /// Confidence below this sends the ticket to review.
    pub confidence_threshold: f64,
    pub total_feedback_count: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl CategoryPolicyParameter {
    /// A zero-counter row seeded with `threshold`.
    pub fn seeded(category: TicketCategory, threshold: f64, now: DateTime<Utc>) -> Self {
        Self {
            category,
            confidence_threshold: threshold,
            total_feedback_count: 0,
            correct_count: 0,
            incorrect_count: 0,
            last_updated: now,
        }
    }
}

// ---------------------------------------------------------------------------
// AgentSettings
// ---------------------------------------------------------------------------

/// Global agent defaults. Read-only from the agent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub confidence_threshold: f64,
    pub enable_auto_assign: bool,
    pub enable_auto_ask_clarifying_questions: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            enable_auto_assign: true,
            enable_auto_ask_clarifying_questions: true,
        }
    }
}

// ---------------------------------------------------------------------------
// QueueSnapshot
// ---------------------------------------------------------------------------

/// Ticket counts per status at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub total: u64,
    pub queued: u64,
    pub processing: u64,
    pub waiting_for_user: u64,
    pub needs_review: u64,
    pub assigned: u64,
    pub timestamp: DateTime<Utc>,
}
