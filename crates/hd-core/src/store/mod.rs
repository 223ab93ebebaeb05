//! Persistence boundary for tickets, events, feedback, policy rows and settings.
//!
//! The agent only talks to [`TicketStore`]. Every operation is a single atomic
//! unit: it either commits completely or reports a [`StoreError`].

mod sqlite;

pub use sqlite::SqliteTicketStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    AgentSettings, CategoryPolicyParameter, FeedbackEntry, QueueSnapshot, SupportTeam, Ticket,
    TicketCategory, TicketEvent, TicketPriority, TicketStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// A `mark_*` write on a ticket that is not being processed.
    #[error("ticket {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(rusqlite::Error::FromSqlConversionFailure(
                idx,
                _,
                source,
            )) => StoreError::Corrupt(format!("column {idx}: {source}")),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Result of a `mark_*` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Status changed and one event was appended.
    Applied,
    /// The ticket already carried the same decision; nothing was written.
    Unchanged,
}

/// Key fields written by [`TicketStore::mark_assigned`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub team: SupportTeam,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub confidence: f64,
}

/// Mutation applied to a policy row inside [`TicketStore::modify_policy_parameter`].
pub type PolicyUpdate = Box<dyn FnOnce(&mut CategoryPolicyParameter) + Send + 'static>;

#[async_trait]
pub trait TicketStore: Send + Sync {
    // -- tickets ------------------------------------------------------------

    /// Insert a new ticket. Its status is forced to `Queued`.
    async fn enqueue(&self, ticket: &Ticket) -> StoreResult<()>;

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>>;

    /// Atomically move the oldest `Queued` ticket to `Processing` and return it.
    ///
    /// Returns `None` when the queue is empty or every bounded attempt lost the
    /// race to another claimer.
    async fn claim_next_queued(&self) -> StoreResult<Option<Ticket>>;

    async fn mark_waiting_for_user(
        &self,
        id: Uuid,
        question: &str,
        missing_fields: &[String],
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome>;

    async fn mark_needs_review(
        &self,
        id: Uuid,
        reason: &str,
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome>;

    async fn mark_assigned(
        &self,
        id: Uuid,
        assignment: &Assignment,
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome>;

    /// Overwrite category and priority after a human correction.
    async fn apply_correction(
        &self,
        id: Uuid,
        category: TicketCategory,
        priority: TicketPriority,
    ) -> StoreResult<()>;

    async fn list_tickets_by_status(&self, status: TicketStatus) -> StoreResult<Vec<Ticket>>;

    /// Move `Processing` tickets last updated before `older_than` back to
    /// `Queued`. Returns the ids that were moved.
    async fn requeue_stale_processing(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;

    async fn queue_snapshot(&self) -> StoreResult<QueueSnapshot>;

    // -- events -------------------------------------------------------------

    /// Events for a ticket, oldest first.
    async fn list_events(&self, ticket_id: Uuid) -> StoreResult<Vec<TicketEvent>>;

    // -- settings -----------------------------------------------------------

    /// Stored settings, or [`AgentSettings::default`] when none were saved.
    async fn get_settings(&self) -> StoreResult<AgentSettings>;

    async fn save_settings(&self, settings: &AgentSettings) -> StoreResult<()>;

    /// Insert `settings` only if no row exists yet. Returns `true` if inserted.
    async fn seed_settings(&self, settings: &AgentSettings) -> StoreResult<bool>;

    // -- policy -------------------------------------------------------------

    async fn get_policy_parameter(
        &self,
        category: TicketCategory,
    ) -> StoreResult<Option<CategoryPolicyParameter>>;

    async fn upsert_policy_parameter(&self, row: &CategoryPolicyParameter) -> StoreResult<()>;

    /// All policy rows ordered by category.
    async fn list_policy_parameters(&self) -> StoreResult<Vec<CategoryPolicyParameter>>;

    /// Load the row for `category` (seeding it at `seed_threshold` if absent),
    /// apply `update` and write it back, all in one transaction.
    async fn modify_policy_parameter(
        &self,
        category: TicketCategory,
        seed_threshold: f64,
        update: PolicyUpdate,
    ) -> StoreResult<CategoryPolicyParameter>;

    // -- feedback -----------------------------------------------------------

    async fn append_feedback(&self, entry: &FeedbackEntry) -> StoreResult<()>;

    async fn list_feedback(&self, ticket_id: Uuid) -> StoreResult<Vec<FeedbackEntry>>;
}
