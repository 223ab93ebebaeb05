use std::sync::Arc;

use anyhow::{Context, Result};
use hd_core::store::TicketStore;
use hd_core::types::{QueueSnapshot, TicketStatus};
use hd_telemetry::metrics::{global_metrics, QUEUE_TICKETS};
use tracing::info;

/// Periodic per-status ticket counts.
pub struct QueueSnapshotCollector {
    store: Arc<dyn TicketStore>,
}

impl QueueSnapshotCollector {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Take a snapshot, log it and publish it as `helpdesk_queue_tickets{status}`.
    pub async fn collect_snapshot(&self) -> Result<QueueSnapshot> {
        let snapshot = self
            .store
            .queue_snapshot()
            .await
            .context("failed to compute queue snapshot")?;

        let metrics = global_metrics();
        for (status, count) in [
            (TicketStatus::Queued, snapshot.queued),
            (TicketStatus::Processing, snapshot.processing),
            (TicketStatus::WaitingForUser, snapshot.waiting_for_user),
            (TicketStatus::NeedsReview, snapshot.needs_review),
            (TicketStatus::Assigned, snapshot.assigned),
        ] {
            metrics.set_gauge(QUEUE_TICKETS, &[("status", status.as_str())], count as i64);
        }

        info!(
            total = snapshot.total,
            queued = snapshot.queued,
            processing = snapshot.processing,
            waiting_for_user = snapshot.waiting_for_user,
            needs_review = snapshot.needs_review,
            assigned = snapshot.assigned,
            "queue snapshot"
        );
        Ok(snapshot)
    }
}
