use std::sync::Arc;

use chrono::{DateTime, Utc};
use hd_core::clock::Clock;
use hd_core::store::TicketStore;
use hd_core::types::{SupportTeam, Ticket, TicketCategory, TicketPriority, TicketStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Demo tickets as `(customer_id, subject, body)`.
pub const SAMPLE_TICKETS: [(&str, &str, &str); 5] = [
    (
        "CUST-001",
        "Cannot login to my account",
        "I forgot my password and cannot sign in. Please help me reset it.",
    ),
    (
        "CUST-002",
        "Billing question",
        "I was charged twice this month. Can you please refund the duplicate payment?",
    ),
    (
        "CUST-003",
        "Application error",
        "The app crashes when I try to open the settings page. Error message says 'NullReferenceException'.",
    ),
    (
        "CUST-004",
        "Feature request",
        "How can I export my data? I don't see this option anywhere.",
    ),
    (
        "CUST-005",
        "URGENT: Security issue",
        "I noticed unauthorized access to my account. This is urgent!",
    ),
];

/// Read model of a ticket plus its latest event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketView {
    pub id: Uuid,
    pub status: TicketStatus,
    pub category: Option<TicketCategory>,
    pub priority: Option<TicketPriority>,
    pub assigned_team: Option<SupportTeam>,
    pub confidence: Option<f64>,
    pub required_fields_missing: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Explanation attached to the latest event.
    pub explanation: Option<String>,
    pub missing_fields: Option<Vec<String>>,
    /// Description of the latest event (question, reason or assignment).
    pub latest_note: Option<String>,
}

/// Ticket creation and lookup.
pub struct Intake {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
}

impl Intake {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn enqueue_ticket(
        &self,
        customer_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<Ticket> {
        let ticket = Ticket::new(customer_id, subject, body, self.clock.now());
        self.store.enqueue(&ticket).await?;
        tracing::info!(ticket_id = %ticket.id, customer_id, "ticket queued");
        Ok(ticket)
    }

    pub async fn ticket_view(&self, id: Uuid) -> Result<TicketView> {
        let ticket = self
            .store
            .get_ticket(id)
            .await?
            .ok_or(AgentError::TicketNotFound(id))?;
        let latest = self.store.list_events(id).await?.pop();

        let missing = ticket.missing_field_list();
        Ok(TicketView {
            id: ticket.id,
            status: ticket.status,
            category: ticket.category,
            priority: ticket.priority,
            assigned_team: ticket.assigned_team,
            confidence: ticket.confidence,
            required_fields_missing: ticket.missing_fields,
            updated_at: ticket.updated_at,
            explanation: latest.as_ref().and_then(|e| e.explanation.clone()),
            missing_fields: (!missing.is_empty()).then_some(missing),
            latest_note: latest.map(|e| e.description),
        })
    }

    /// Enqueue [`SAMPLE_TICKETS`] if the store holds no tickets yet.
    pub async fn seed_samples(&self) -> Result<Vec<Ticket>> {
        if self.store.queue_snapshot().await?.total > 0 {
            tracing::debug!("store already has tickets, skipping samples");
            return Ok(Vec::new());
        }
        let mut seeded = Vec::with_capacity(SAMPLE_TICKETS.len());
        for (customer_id, subject, body) in SAMPLE_TICKETS {
            seeded.push(self.enqueue_ticket(customer_id, subject, body).await?);
        }
        Ok(seeded)
    }
}
