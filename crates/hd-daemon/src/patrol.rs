use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hd_core::clock::{Clock, SystemClock};
use hd_core::store::TicketStore;
use hd_core::types::TicketStatus;
use hd_telemetry::metrics::{global_metrics, REQUEUED_TOTAL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a single patrol sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolReport {
    /// Tickets in `Processing` whose last update is older than the timeout.
    pub stuck_ticket_ids: Vec<Uuid>,
    /// Subset of the stuck tickets moved back to `Queued` by this sweep.
    pub requeued_ticket_ids: Vec<Uuid>,
    pub cutoff: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl PatrolReport {
    pub fn stuck(&self) -> usize {
        self.stuck_ticket_ids.len()
    }

    pub fn requeued(&self) -> usize {
        self.requeued_ticket_ids.len()
    }
}

/// Looks for tickets abandoned mid-tick by a crashed worker.
///
/// Report-only by default. With `requeue` enabled, stuck tickets are put
/// back in the queue through a conditional update, so a ticket that finished
/// processing between the scan and the update is left alone.
pub struct PatrolRunner {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    processing_timeout: ChronoDuration,
    requeue: bool,
}

impl PatrolRunner {
    pub fn new(store: Arc<dyn TicketStore>, processing_timeout: ChronoDuration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            processing_timeout,
            requeue: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_requeue(mut self, requeue: bool) -> Self {
        self.requeue = requeue;
        self
    }

    pub async fn run_patrol(&self) -> Result<PatrolReport> {
        let now = self.clock.now();
        let cutoff = now - self.processing_timeout;
        debug!(%cutoff, "patrol sweep starting");

        let processing = self
            .store
            .list_tickets_by_status(TicketStatus::Processing)
            .await
            .context("failed to list processing tickets")?;

        let mut stuck_ticket_ids = Vec::new();
        for ticket in processing.iter().filter(|t| t.updated_at < cutoff) {
            warn!(
                ticket_id = %ticket.id,
                updated_at = %ticket.updated_at,
                stuck_for_secs = (now - ticket.updated_at).num_seconds(),
                "ticket stuck in processing"
            );
            stuck_ticket_ids.push(ticket.id);
        }

        let requeued_ticket_ids = if self.requeue && !stuck_ticket_ids.is_empty() {
            let ids = self
                .store
                .requeue_stale_processing(cutoff)
                .await
                .context("failed to requeue stale tickets")?;
            global_metrics().increment_counter_by(REQUEUED_TOTAL, &[], ids.len() as u64);
            for id in &ids {
                info!(ticket_id = %id, "stale ticket requeued");
            }
            ids
        } else {
            Vec::new()
        };

        let report = PatrolReport {
            stuck_ticket_ids,
            requeued_ticket_ids,
            cutoff,
            timestamp: now,
        };
        debug!(
            stuck = report.stuck(),
            requeued = report.requeued(),
            "patrol sweep completed"
        );
        Ok(report)
    }
}
