use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::{Assignment, MarkOutcome, PolicyUpdate, StoreError, StoreResult, TicketStore};
use crate::clock::{Clock, SystemClock};
use crate::types::{
    AgentDecision, AgentSettings, CategoryPolicyParameter, FeedbackEntry, QueueSnapshot, Ticket,
    TicketCategory, TicketEvent, TicketEventKind, TicketPriority, TicketStatus,
};

/// Default number of find-then-update rounds in `claim_next_queued`.
pub const DEFAULT_CLAIM_ATTEMPTS: u32 = 3;

/// Two confidences closer than this count as the same assignment.
const CONFIDENCE_EPSILON: f64 = 1e-4;

const TICKET_COLUMNS: &str = "id, customer_id, subject, body, created_at, updated_at, status, \
     category, priority, assigned_team, confidence, last_decision, missing_fields";

/// SQLite-backed [`TicketStore`] running on a dedicated connection thread.
pub struct SqliteTicketStore {
    conn: Connection,
    clock: Arc<dyn Clock>,
    claim_attempts: u32,
}

// ---------------------------------------------------------------------------
// helpers – values <-> SQLite
// ---------------------------------------------------------------------------

/// Fixed-width UTC timestamp so lexical order equals chronological order.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_opt_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

impl SqliteTicketStore {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::with_connection(conn).await
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn,
            clock: Arc::new(SystemClock),
            claim_attempts: DEFAULT_CLAIM_ATTEMPTS,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Use `clock` for every timestamp this store writes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the bounded claim retry count (minimum 1).
    pub fn with_claim_attempts(mut self, attempts: u32) -> Self {
        self.claim_attempts = attempts.max(1);
        self
    }

    fn now(&self) -> String {
        ts_to_sql(self.clock.now())
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> StoreResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA busy_timeout=5000;
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;

                    CREATE TABLE IF NOT EXISTS tickets (
                        id             TEXT PRIMARY KEY,
                        customer_id    TEXT NOT NULL,
                        subject        TEXT NOT NULL,
                        body           TEXT NOT NULL,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL,
                        status         TEXT NOT NULL,
                        category       TEXT,
                        priority       TEXT,
                        assigned_team  TEXT,
                        confidence     REAL,
                        last_decision  TEXT,
                        missing_fields TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_tickets_status_created
                        ON tickets(status, created_at);

                    CREATE TABLE IF NOT EXISTS ticket_events (
                        id          TEXT PRIMARY KEY,
                        ticket_id   TEXT NOT NULL REFERENCES tickets(id),
                        timestamp   TEXT NOT NULL,
                        kind        TEXT NOT NULL,
                        description TEXT NOT NULL,
                        explanation TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_events_ticket ON ticket_events(ticket_id);

                    CREATE TABLE IF NOT EXISTS feedback_entries (
                        id                   TEXT PRIMARY KEY,
                        ticket_id            TEXT NOT NULL REFERENCES tickets(id),
                        timestamp            TEXT NOT NULL,
                        original_category    TEXT NOT NULL,
                        original_priority    TEXT NOT NULL,
                        correct_category     TEXT NOT NULL,
                        correct_priority     TEXT NOT NULL,
                        was_category_correct INTEGER NOT NULL,
                        was_priority_correct INTEGER NOT NULL,
                        note                 TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_feedback_ticket ON feedback_entries(ticket_id);

                    CREATE TABLE IF NOT EXISTS category_policy_parameters (
                        category             TEXT NOT NULL UNIQUE,
                        confidence_threshold REAL NOT NULL,
                        total_feedback_count INTEGER NOT NULL DEFAULT 0,
                        correct_count        INTEGER NOT NULL DEFAULT 0,
                        incorrect_count      INTEGER NOT NULL DEFAULT 0,
                        last_updated         TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS agent_settings (
                        id                                   INTEGER PRIMARY KEY CHECK (id = 1),
                        confidence_threshold                 REAL NOT NULL,
                        enable_auto_assign                   INTEGER NOT NULL,
                        enable_auto_ask_clarifying_questions INTEGER NOT NULL
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // MarkX
    // -----------------------------------------------------------------------

    async fn mark(
        &self,
        id: Uuid,
        write: MarkWrite,
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome> {
        let id_str = id.to_string();
        let explanation = explanation.map(str::to_string);
        let now = self.now();
        let target = write.target_status();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current = tx
                    .query_row(
                        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                        params![id_str],
                        row_to_ticket,
                    )
                    .optional()?;
                let Some(current) = current else {
                    return Ok(MarkRow::Missing);
                };

                if write.already_applied(&current) {
                    return Ok(MarkRow::Done(MarkOutcome::Unchanged));
                }
                // only a claimed ticket may take a decision
                if !current.status.can_transition_to(&write.target_status()) {
                    return Ok(MarkRow::Rejected(current.status));
                }

                match &write {
                    MarkWrite::WaitingForUser { missing_joined, .. } => {
                        tx.execute(
                            "UPDATE tickets SET status = ?1, missing_fields = ?2,
                                last_decision = ?3, updated_at = ?4
                             WHERE id = ?5",
                            params![
                                TicketStatus::WaitingForUser.as_str(),
                                missing_joined,
                                AgentDecision::AskedForInfo.as_str(),
                                now,
                                id_str,
                            ],
                        )?;
                    }
                    MarkWrite::NeedsReview { .. } => {
                        tx.execute(
                            "UPDATE tickets SET status = ?1, last_decision = ?2, updated_at = ?3
                             WHERE id = ?4",
                            params![
                                TicketStatus::NeedsReview.as_str(),
                                AgentDecision::SentToReview.as_str(),
                                now,
                                id_str,
                            ],
                        )?;
                    }
                    MarkWrite::Assigned(a) => {
                        tx.execute(
                            "UPDATE tickets SET status = ?1, assigned_team = ?2, category = ?3,
                                priority = ?4, confidence = ?5, last_decision = ?6,
                                updated_at = ?7
                             WHERE id = ?8",
                            params![
                                TicketStatus::Assigned.as_str(),
                                a.team.as_str(),
                                a.category.as_str(),
                                a.priority.as_str(),
                                a.confidence,
                                AgentDecision::AutoAssigned.as_str(),
                                now,
                                id_str,
                            ],
                        )?;
                    }
                }

                tx.execute(
                    "INSERT INTO ticket_events (id, ticket_id, timestamp, kind, description, explanation)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        Uuid::new_v4().to_string(),
                        id_str,
                        now,
                        write.kind().as_str(),
                        write.description(),
                        explanation,
                    ],
                )?;
                tx.commit()?;
                Ok(MarkRow::Done(MarkOutcome::Applied))
            })
            .await?;

        match outcome {
            MarkRow::Done(outcome) => {
                tracing::debug!(ticket_id = %id, ?outcome, "mark");
                Ok(outcome)
            }
            MarkRow::Missing => Err(StoreError::TicketNotFound(id)),
            MarkRow::Rejected(from) => {
                tracing::warn!(ticket_id = %id, %from, to = %target, "mark rejected");
                Err(StoreError::InvalidTransition {
                    id,
                    from,
                    to: target,
                })
            }
        }
    }
}

/// What the mark transaction found.
enum MarkRow {
    Missing,
    Rejected(TicketStatus),
    Done(MarkOutcome),
}

/// Target state of a `mark_*` call.
enum MarkWrite {
    WaitingForUser {
        question: String,
        missing_joined: String,
    },
    NeedsReview {
        reason: String,
    },
    Assigned(Assignment),
}

impl MarkWrite {
    fn kind(&self) -> TicketEventKind {
        match self {
            MarkWrite::WaitingForUser { .. } => TicketEventKind::WaitingForUser,
            MarkWrite::NeedsReview { .. } => TicketEventKind::NeedsReview,
            MarkWrite::Assigned(_) => TicketEventKind::Assigned,
        }
    }

    fn target_status(&self) -> TicketStatus {
        match self {
            MarkWrite::WaitingForUser { .. } => TicketStatus::WaitingForUser,
            MarkWrite::NeedsReview { .. } => TicketStatus::NeedsReview,
            MarkWrite::Assigned(_) => TicketStatus::Assigned,
        }
    }

    fn description(&self) -> String {
        match self {
            MarkWrite::WaitingForUser { question, .. } => question.clone(),
            MarkWrite::NeedsReview { reason } => reason.clone(),
            MarkWrite::Assigned(a) => format!(
                "Assigned to {}, Category: {}, Priority: {}, Confidence: {:.2}",
                a.team, a.category, a.priority, a.confidence
            ),
        }
    }

    /// True when repeating this write would change nothing.
    fn already_applied(&self, current: &Ticket) -> bool {
        match self {
            MarkWrite::WaitingForUser { missing_joined, .. } => {
                current.status == TicketStatus::WaitingForUser
                    && current.missing_fields.as_deref().unwrap_or("") == missing_joined
            }
            MarkWrite::NeedsReview { .. } => current.status == TicketStatus::NeedsReview,
            MarkWrite::Assigned(a) => {
                current.status == TicketStatus::Assigned
                    && current.assigned_team == Some(a.team)
                    && current.category == Some(a.category)
                    && current.priority == Some(a.priority)
                    && (current.confidence.unwrap_or(0.0) - a.confidence).abs()
                        < CONFIDENCE_EPSILON
            }
        }
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn enqueue(&self, ticket: &Ticket) -> StoreResult<()> {
        let id = ticket.id.to_string();
        let customer_id = ticket.customer_id.clone();
        let subject = ticket.subject.clone();
        let body = ticket.body.clone();
        let created_at = ts_to_sql(ticket.created_at);
        let updated_at = self.now();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tickets (id, customer_id, subject, body, created_at,
                        updated_at, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        customer_id,
                        subject,
                        body,
                        created_at,
                        updated_at,
                        TicketStatus::Queued.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!(ticket_id = %ticket.id, "ticket enqueued");
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let id_str = id.to_string();
        let ticket = self
            .conn
            .call(move |conn| {
                let ticket = conn
                    .query_row(
                        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                        params![id_str],
                        row_to_ticket,
                    )
                    .optional()?;
                Ok(ticket)
            })
            .await?;
        Ok(ticket)
    }

    async fn claim_next_queued(&self) -> StoreResult<Option<Ticket>> {
        let attempts = self.claim_attempts;
        let now = self.now();

        let claimed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                for _ in 0..attempts {
                    let next: Option<String> = tx
                        .query_row(
                            "SELECT id FROM tickets WHERE status = ?1
                             ORDER BY created_at ASC, id ASC LIMIT 1",
                            params![TicketStatus::Queued.as_str()],
                            |r| r.get(0),
                        )
                        .optional()?;
                    let Some(id) = next else {
                        tx.commit()?;
                        return Ok(None);
                    };

                    let changed = tx.execute(
                        "UPDATE tickets SET status = ?1, updated_at = ?2
                         WHERE id = ?3 AND status = ?4",
                        params![
                            TicketStatus::Processing.as_str(),
                            now,
                            id,
                            TicketStatus::Queued.as_str(),
                        ],
                    )?;
                    if changed == 0 {
                        continue;
                    }

                    let ticket = tx.query_row(
                        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                        params![id],
                        row_to_ticket,
                    )?;
                    tx.commit()?;
                    return Ok(Some(ticket));
                }
                tx.commit()?;
                Ok(None)
            })
            .await?;

        if let Some(ticket) = &claimed {
            tracing::debug!(ticket_id = %ticket.id, "ticket claimed");
        }
        Ok(claimed)
    }

    async fn mark_waiting_for_user(
        &self,
        id: Uuid,
        question: &str,
        missing_fields: &[String],
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome> {
        let write = MarkWrite::WaitingForUser {
            question: question.to_string(),
            missing_joined: missing_fields.join(", "),
        };
        self.mark(id, write, explanation).await
    }

    async fn mark_needs_review(
        &self,
        id: Uuid,
        reason: &str,
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome> {
        let write = MarkWrite::NeedsReview {
            reason: reason.to_string(),
        };
        self.mark(id, write, explanation).await
    }

    async fn mark_assigned(
        &self,
        id: Uuid,
        assignment: &Assignment,
        explanation: Option<&str>,
    ) -> StoreResult<MarkOutcome> {
        self.mark(id, MarkWrite::Assigned(*assignment), explanation)
            .await
    }

    async fn apply_correction(
        &self,
        id: Uuid,
        category: TicketCategory,
        priority: TicketPriority,
    ) -> StoreResult<()> {
        let id_str = id.to_string();
        let now = self.now();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE tickets SET category = ?1, priority = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![category.as_str(), priority.as_str(), now, id_str],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(StoreError::TicketNotFound(id));
        }
        Ok(())
    }

    async fn list_tickets_by_status(&self, status: TicketStatus) -> StoreResult<Vec<Ticket>> {
        let tickets = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets WHERE status = ?1
                     ORDER BY created_at ASC, id ASC"
                ))?;
                let mut rows = stmt.query(params![status.as_str()])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_ticket(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(tickets)
    }

    async fn requeue_stale_processing(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let cutoff = ts_to_sql(older_than);
        let now = self.now();
        let moved = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let candidates: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM tickets WHERE status = ?1 AND updated_at < ?2
                         ORDER BY created_at ASC",
                    )?;
                    let rows = stmt.query_map(
                        params![TicketStatus::Processing.as_str(), cutoff],
                        |r| r.get(0),
                    )?;
                    rows.collect::<rusqlite::Result<_>>()?
                };

                let mut moved = Vec::new();
                for id in candidates {
                    let changed = tx.execute(
                        "UPDATE tickets SET status = ?1, updated_at = ?2
                         WHERE id = ?3 AND status = ?4 AND updated_at < ?5",
                        params![
                            TicketStatus::Queued.as_str(),
                            now,
                            id,
                            TicketStatus::Processing.as_str(),
                            cutoff,
                        ],
                    )?;
                    if changed == 1 {
                        let parsed =
                            Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;
                        moved.push(parsed);
                    }
                }
                tx.commit()?;
                Ok(moved)
            })
            .await?;
        Ok(moved)
    }

    async fn queue_snapshot(&self) -> StoreResult<QueueSnapshot> {
        let timestamp = self.clock.now();
        let counts = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM tickets GROUP BY status")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let status: TicketStatus = parse_col(row, 0)?;
                    let count: u64 = row.get(1)?;
                    out.push((status, count));
                }
                Ok(out)
            })
            .await?;

        let mut snapshot = QueueSnapshot {
            timestamp,
            ..QueueSnapshot::default()
        };
        for (status, count) in counts {
            snapshot.total += count;
            match status {
                TicketStatus::Queued => snapshot.queued = count,
                TicketStatus::Processing => snapshot.processing = count,
                TicketStatus::WaitingForUser => snapshot.waiting_for_user = count,
                TicketStatus::NeedsReview => snapshot.needs_review = count,
                TicketStatus::Assigned => snapshot.assigned = count,
            }
        }
        Ok(snapshot)
    }

    async fn list_events(&self, ticket_id: Uuid) -> StoreResult<Vec<TicketEvent>> {
        let id_str = ticket_id.to_string();
        let events = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, ticket_id, timestamp, kind, description, explanation
                     FROM ticket_events WHERE ticket_id = ?1
                     ORDER BY timestamp ASC, rowid ASC",
                )?;
                let mut rows = stmt.query(params![id_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_event(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(events)
    }

    async fn get_settings(&self) -> StoreResult<AgentSettings> {
        let settings = self
            .conn
            .call(|conn| {
                let settings = conn
                    .query_row(
                        "SELECT confidence_threshold, enable_auto_assign,
                                enable_auto_ask_clarifying_questions
                         FROM agent_settings WHERE id = 1",
                        [],
                        |r| {
                            Ok(AgentSettings {
                                confidence_threshold: r.get(0)?,
                                enable_auto_assign: r.get(1)?,
                                enable_auto_ask_clarifying_questions: r.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(settings)
            })
            .await?;
        Ok(settings.unwrap_or_default())
    }

    async fn save_settings(&self, settings: &AgentSettings) -> StoreResult<()> {
        let s = *settings;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agent_settings (id, confidence_threshold, enable_auto_assign,
                        enable_auto_ask_clarifying_questions)
                     VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                        confidence_threshold = excluded.confidence_threshold,
                        enable_auto_assign = excluded.enable_auto_assign,
                        enable_auto_ask_clarifying_questions =
                            excluded.enable_auto_ask_clarifying_questions",
                    params![
                        s.confidence_threshold,
                        s.enable_auto_assign,
                        s.enable_auto_ask_clarifying_questions,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn seed_settings(&self, settings: &AgentSettings) -> StoreResult<bool> {
        let s = *settings;
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO agent_settings (id, confidence_threshold,
                        enable_auto_assign, enable_auto_ask_clarifying_questions)
                     VALUES (1, ?1, ?2, ?3)",
                    params![
                        s.confidence_threshold,
                        s.enable_auto_assign,
                        s.enable_auto_ask_clarifying_questions,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;
        Ok(inserted)
    }

    async fn get_policy_parameter(
        &self,
        category: TicketCategory,
    ) -> StoreResult<Option<CategoryPolicyParameter>> {
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT category, confidence_threshold, total_feedback_count,
                                correct_count, incorrect_count, last_updated
                         FROM category_policy_parameters WHERE category = ?1",
                        params![category.as_str()],
                        row_to_policy,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    async fn upsert_policy_parameter(&self, row: &CategoryPolicyParameter) -> StoreResult<()> {
        let row = row.clone();
        self.conn
            .call(move |conn| {
                write_policy(conn, &row)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_policy_parameters(&self) -> StoreResult<Vec<CategoryPolicyParameter>> {
        let mut rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT category, confidence_threshold, total_feedback_count,
                            correct_count, incorrect_count, last_updated
                     FROM category_policy_parameters",
                )?;
                let rows = stmt
                    .query_map([], row_to_policy)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.sort_by_key(|p| p.category);
        Ok(rows)
    }

    async fn modify_policy_parameter(
        &self,
        category: TicketCategory,
        seed_threshold: f64,
        update: PolicyUpdate,
    ) -> StoreResult<CategoryPolicyParameter> {
        let now = self.clock.now();
        let row = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = tx
                    .query_row(
                        "SELECT category, confidence_threshold, total_feedback_count,
                                correct_count, incorrect_count, last_updated
                         FROM category_policy_parameters WHERE category = ?1",
                        params![category.as_str()],
                        row_to_policy,
                    )
                    .optional()?;
                let mut row = existing
                    .unwrap_or_else(|| CategoryPolicyParameter::seeded(category, seed_threshold, now));
                update(&mut row);
                row.last_updated = now;
                write_policy(&tx, &row)?;
                tx.commit()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    async fn append_feedback(&self, entry: &FeedbackEntry) -> StoreResult<()> {
        let e = entry.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feedback_entries (id, ticket_id, timestamp, original_category,
                        original_priority, correct_category, correct_priority,
                        was_category_correct, was_priority_correct, note)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        e.id.to_string(),
                        e.ticket_id.to_string(),
                        ts_to_sql(e.timestamp),
                        e.original_category.as_str(),
                        e.original_priority.as_str(),
                        e.correct_category.as_str(),
                        e.correct_priority.as_str(),
                        e.was_category_correct,
                        e.was_priority_correct,
                        e.note,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_feedback(&self, ticket_id: Uuid) -> StoreResult<Vec<FeedbackEntry>> {
        let id_str = ticket_id.to_string();
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, ticket_id, timestamp, original_category, original_priority,
                            correct_category, correct_priority, was_category_correct,
                            was_priority_correct, note
                     FROM feedback_entries WHERE ticket_id = ?1
                     ORDER BY timestamp ASC, rowid ASC",
                )?;
                let entries = stmt
                    .query_map(params![id_str], row_to_feedback)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }
}

fn write_policy(conn: &rusqlite::Connection, row: &CategoryPolicyParameter) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO category_policy_parameters (category, confidence_threshold,
            total_feedback_count, correct_count, incorrect_count, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(category) DO UPDATE SET
            confidence_threshold = excluded.confidence_threshold,
            total_feedback_count = excluded.total_feedback_count,
            correct_count = excluded.correct_count,
            incorrect_count = excluded.incorrect_count,
            last_updated = excluded.last_updated",
        params![
            row.category.as_str(),
            row.confidence_threshold,
            row.total_feedback_count,
            row.correct_count,
            row.incorrect_count,
            ts_to_sql(row.last_updated),
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: parse_col(row, 0)?,
        customer_id: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
        status: parse_col(row, 6)?,
        category: parse_opt_col(row, 7)?,
        priority: parse_opt_col(row, 8)?,
        assigned_team: parse_opt_col(row, 9)?,
        confidence: row.get(10)?,
        last_decision: parse_opt_col(row, 11)?,
        missing_fields: row.get(12)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketEvent> {
    Ok(TicketEvent {
        id: parse_col(row, 0)?,
        ticket_id: parse_col(row, 1)?,
        timestamp: ts_col(row, 2)?,
        kind: parse_col(row, 3)?,
        description: row.get(4)?,
        explanation: row.get(5)?,
    })
}

fn row_to_feedback(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedbackEntry> {
    Ok(FeedbackEntry {
        id: parse_col(row, 0)?,
        ticket_id: parse_col(row, 1)?,
        timestamp: ts_col(row, 2)?,
        original_category: parse_col(row, 3)?,
        original_priority: parse_col(row, 4)?,
        correct_category: parse_col(row, 5)?,
        correct_priority: parse_col(row, 6)?,
        was_category_correct: row.get(7)?,
        was_priority_correct: row.get(8)?,
        note: row.get(9)?,
    })
}

fn row_to_policy(row: &rusqlite::Row<'_>) -> rusqlite::Result<CategoryPolicyParameter> {
    Ok(CategoryPolicyParameter {
        category: parse_col(row, 0)?,
        confidence_threshold: row.get(1)?,
        total_feedback_count: row.get(2)?,
        correct_count: row.get(3)?,
        incorrect_count: row.get(4)?,
        last_updated: ts_col(row, 5)?,
    })
}
