use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hd_agent::{AgentStep, TicketAgent};
use hd_core::config::Config;
use hd_core::store::{SqliteTicketStore, TicketStore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::kpi::QueueSnapshotCollector;
use crate::patrol::PatrolRunner;
use crate::shutdown::{DrainResult, ShutdownSignal};
use crate::worker::{TicketWorker, WorkerStats};

/// How long `run` waits for in-flight ticks after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Loop intervals, taken from the `[worker]`, `[patrol]` and `[kpi]` sections.
#[derive(Debug, Clone)]
pub struct DaemonIntervals {
    pub tick: Duration,
    pub patrol: Duration,
    pub kpi: Duration,
}

impl DaemonIntervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: Duration::from_millis(config.worker.tick_interval_ms),
            patrol: Duration::from_secs(config.patrol.interval_secs),
            kpi: Duration::from_secs(config.kpi.interval_secs),
        }
    }
}

/// The helpdesk background daemon.
///
/// Runs `worker.count` driving loops plus the patrol and queue snapshot
/// loops until the [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    store: Arc<dyn TicketStore>,
    agent: Arc<dyn AgentStep>,
    intervals: DaemonIntervals,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Build a daemon over an already-open store.
    pub fn with_store(config: Config, store: Arc<dyn TicketStore>) -> Self {
        let agent: Arc<dyn AgentStep> = Arc::new(TicketAgent::new(Arc::clone(&store)));
        Self {
            intervals: DaemonIntervals::from_config(&config),
            config,
            store,
            agent,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Open (or create) the SQLite store named in `[store]` and seed the
    /// settings row from `[agent]` when none exists.
    pub async fn new(config: Config) -> Result<Self> {
        let path = config.store.resolved_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = SqliteTicketStore::new(&path)
            .await
            .with_context(|| format!("failed to open ticket store at {}", path.display()))?
            .with_claim_attempts(config.store.claim_attempts);
        let store: Arc<dyn TicketStore> = Arc::new(store);

        if store
            .seed_settings(&config.agent.settings())
            .await
            .context("failed to seed agent settings")?
        {
            info!(
                threshold = config.agent.confidence_threshold,
                "agent settings seeded from config"
            );
        }
        info!(path = %path.display(), "ticket store ready");
        Ok(Self::with_store(config, store))
    }

    /// Replace the step function every worker runs.
    pub fn with_agent(mut self, agent: Arc<dyn AgentStep>) -> Self {
        self.agent = agent;
        self
    }

    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// Run until shutdown. Returns the summed worker totals.
    pub async fn run(&self) -> Result<WorkerStats> {
        let worker_count = self.config.worker.count as usize;
        info!(
            workers = worker_count,
            tick_ms = self.intervals.tick.as_millis() as u64,
            patrol_secs = self.intervals.patrol.as_secs(),
            kpi_secs = self.intervals.kpi.as_secs(),
            requeue_stale = self.config.patrol.requeue_stale,
            "daemon starting"
        );

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = TicketWorker::new(id, Arc::clone(&self.agent), self.intervals.tick);
            workers.spawn(worker.run(self.shutdown.clone()));
        }

        self.run_loops().await;

        if let DrainResult::Timeout { .. } =
            self.shutdown.wait_for_drain(worker_count, DRAIN_TIMEOUT).await
        {
            workers.abort_all();
        }

        let mut totals = WorkerStats::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => {
                    totals.processed += stats.processed;
                    totals.idle += stats.idle;
                    totals.errors += stats.errors;
                }
                Err(e) if e.is_cancelled() => warn!("worker aborted during drain"),
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }

        info!(
            processed = totals.processed,
            errors = totals.errors,
            "daemon stopped"
        );
        Ok(totals)
    }

    /// Patrol and snapshot loops; returns on shutdown.
    async fn run_loops(&self) {
        let patrol = PatrolRunner::new(
            Arc::clone(&self.store),
            self.config.patrol.processing_timeout(),
        )
        .with_requeue(self.config.patrol.requeue_stale);
        let snapshots = QueueSnapshotCollector::new(Arc::clone(&self.store));

        let mut patrol_interval = tokio::time::interval(self.intervals.patrol);
        let mut kpi_interval = tokio::time::interval(self.intervals.kpi);

        // Skip the immediate first tick so the loops don't fire at t=0.
        patrol_interval.tick().await;
        kpi_interval.tick().await;

        loop {
            tokio::select! {
                _ = patrol_interval.tick() => {
                    match patrol.run_patrol().await {
                        Ok(report) if report.stuck() > 0 => {
                            warn!(
                                stuck = report.stuck(),
                                requeued = report.requeued(),
                                "patrol found stuck tickets"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "patrol failed"),
                    }
                }
                _ = kpi_interval.tick() => {
                    if let Err(e) = snapshots.collect_snapshot().await {
                        error!(error = %e, "queue snapshot failed");
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("shutdown signal received, stopping background loops");
                    break;
                }
            }
        }
    }
}
