use std::sync::Arc;
use std::time::{Duration, Instant};

use hd_agent::AgentStep;
use hd_telemetry::metrics::{
    global_metrics, MetricsCollector, DECISIONS_TOTAL, TICKS_TOTAL, TICK_DURATION_SECONDS,
    TICK_ERRORS_TOTAL,
};
use tracing::{debug, error, info};

use crate::shutdown::ShutdownSignal;

/// Totals for one worker's lifetime, returned when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub idle: u64,
    pub errors: u64,
}

/// The driving loop: one `step()` per tick, then sleep.
///
/// Errors from a tick are logged and counted; the loop keeps going. A
/// shutdown signal drops the in-flight tick. A store call already running on
/// the connection thread still finishes, so a claimed ticket may be left in
/// `Processing` for the patrol to report.
pub struct TicketWorker {
    id: usize,
    agent: Arc<dyn AgentStep>,
    tick_interval: Duration,
    metrics: &'static MetricsCollector,
}

impl TicketWorker {
    pub fn new(id: usize, agent: Arc<dyn AgentStep>, tick_interval: Duration) -> Self {
        Self {
            id,
            agent,
            tick_interval,
            metrics: global_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: &'static MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn run(self, shutdown: ShutdownSignal) -> WorkerStats {
        let _guard = shutdown.guard();
        let mut stats = WorkerStats::default();
        info!(worker = self.id, interval_ms = self.tick_interval.as_millis() as u64, "worker started");

        loop {
            if shutdown.is_shutting_down() {
                break;
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                res = self.agent.step() => res,
                _ = shutdown.cancelled() => {
                    debug!(worker = self.id, "tick abandoned on shutdown");
                    break;
                }
            };
            self.metrics
                .record_histogram(TICK_DURATION_SECONDS, started.elapsed().as_secs_f64());

            match outcome {
                Ok(Some(result)) => {
                    stats.processed += 1;
                    self.metrics
                        .increment_counter(TICKS_TOTAL, &[("outcome", "processed")]);
                    self.metrics.increment_counter(
                        DECISIONS_TOTAL,
                        &[("decision", result.decision.as_str())],
                    );
                    info!(
                        worker = self.id,
                        ticket_id = %result.ticket_id,
                        decision = %result.decision,
                        status = %result.new_status,
                        category = %result.category,
                        priority = %result.priority,
                        confidence = result.confidence,
                        "ticket processed"
                    );
                }
                Ok(None) => {
                    stats.idle += 1;
                    self.metrics.increment_counter(TICKS_TOTAL, &[("outcome", "idle")]);
                    debug!(worker = self.id, "queue empty");
                }
                Err(e) => {
                    stats.errors += 1;
                    self.metrics.increment_counter(TICKS_TOTAL, &[("outcome", "error")]);
                    self.metrics.increment_counter(TICK_ERRORS_TOTAL, &[]);
                    error!(worker = self.id, error = %e, "tick failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!(
            worker = self.id,
            processed = stats.processed,
            idle = stats.idle,
            errors = stats.errors,
            "worker stopped"
        );
        stats
    }
}
