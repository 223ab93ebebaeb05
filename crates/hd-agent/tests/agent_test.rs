use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use hd_agent::{Classifier, FeedbackService, Intake, Router, TicketAgent, SAMPLE_TICKETS};
use hd_core::clock::{Clock, ManualClock, SystemClock};
use hd_core::store::{SqliteTicketStore, TicketStore};
use hd_core::types::*;

struct Harness {
    store: Arc<dyn TicketStore>,
    agent: TicketAgent,
    intake: Intake,
    feedback: FeedbackService,
}

async fn harness() -> Harness {
    let store: Arc<dyn TicketStore> = Arc::new(SqliteTicketStore::new_in_memory().await.unwrap());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Harness {
        agent: TicketAgent::new(Arc::clone(&store)),
        intake: Intake::new(Arc::clone(&store), Arc::clone(&clock)),
        feedback: FeedbackService::new(Arc::clone(&store), clock),
        store,
    }
}

const CRASH_SUBJECT: &str = "Application crash on startup";
const CRASH_BODY: &str = "The app crashed right after the splash screen appears.";

// ---------------------------------------------------------------------------
// Confident technical ticket is auto-assigned
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confident_technical_ticket_is_auto_assigned() {
    let h = harness().await;
    let ticket = h
        .intake
        .enqueue_ticket("CUST-100", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();

    let result = h.agent.step().await.unwrap().expect("work available");
    assert_eq!(result.ticket_id, ticket.id);
    assert_eq!(result.category, TicketCategory::Technical);
    assert_eq!(result.priority, TicketPriority::Medium);
    assert!((result.confidence - 0.75).abs() < 1e-9);
    assert_eq!(result.threshold, 0.7);
    assert_eq!(result.decision, AgentDecision::AutoAssigned);
    assert_eq!(result.new_status, TicketStatus::Assigned);
    assert_eq!(result.team, Some(SupportTeam::TechTeam));
    assert!(result.missing_fields.is_empty());

    let view = h.intake.ticket_view(ticket.id).await.unwrap();
    assert_eq!(view.status, TicketStatus::Assigned);
    assert_eq!(view.assigned_team, Some(SupportTeam::TechTeam));
    assert_eq!(
        view.latest_note.as_deref(),
        Some("Assigned to TechTeam, Category: Technical, Priority: Medium, Confidence: 0.75")
    );
    assert_eq!(
        view.explanation.as_deref(),
        Some("Technical category (1 keyword matches); Medium priority (default)")
    );
    assert!(view.missing_fields.is_none());
}

// ---------------------------------------------------------------------------
// Wrong-category feedback raises the threshold until review
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_wrong_feedback_flips_decision_to_review() {
    let h = harness().await;

    let first = h
        .intake
        .enqueue_ticket("CUST-101", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();
    h.agent.step().await.unwrap().unwrap();

    h.feedback
        .submit_feedback(first.id, TicketCategory::Billing, TicketPriority::Medium, None)
        .await
        .unwrap();
    let row = h
        .store
        .get_policy_parameter(TicketCategory::Technical)
        .await
        .unwrap()
        .expect("row created on first feedback");
    assert_eq!(row.confidence_threshold, 0.75);
    assert_eq!(row.total_feedback_count, 1);
    assert_eq!(row.incorrect_count, 1);

    // 0.75 < 0.75 is false: still assigned.
    let second = h
        .intake
        .enqueue_ticket("CUST-102", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();
    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.ticket_id, second.id);
    assert_eq!(result.threshold, 0.75);
    assert_eq!(result.decision, AgentDecision::AutoAssigned);

    h.feedback
        .submit_feedback(second.id, TicketCategory::Billing, TicketPriority::Medium, None)
        .await
        .unwrap();
    assert_eq!(
        h.feedback
            .learning()
            .effective_threshold(TicketCategory::Technical)
            .await
            .unwrap(),
        0.8
    );

    let third = h
        .intake
        .enqueue_ticket("CUST-103", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();
    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.ticket_id, third.id);
    assert_eq!(result.decision, AgentDecision::SentToReview);
    assert_eq!(result.new_status, TicketStatus::NeedsReview);
    assert_eq!(result.team, None);

    let view = h.intake.ticket_view(third.id).await.unwrap();
    assert_eq!(view.latest_note.as_deref(), Some("Low confidence (0.75 < 0.80)."));
}

#[tokio::test]
async fn learned_threshold_is_per_category() {
    let h = harness().await;
    let ticket = h
        .intake
        .enqueue_ticket("CUST-104", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();
    h.agent.step().await.unwrap().unwrap();
    h.feedback
        .submit_feedback(ticket.id, TicketCategory::Account, TicketPriority::Medium, None)
        .await
        .unwrap();

    let learning = h.feedback.learning();
    assert_eq!(learning.effective_threshold(TicketCategory::Technical).await.unwrap(), 0.75);
    assert_eq!(learning.effective_threshold(TicketCategory::Billing).await.unwrap(), 0.7);
    assert_eq!(learning.all_policy_parameters().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Short error report asks for details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_error_report_asks_for_details() {
    let h = harness().await;
    let ticket = h
        .intake
        .enqueue_ticket("CUST-105", "Crash", "error on boot")
        .await
        .unwrap();

    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.category, TicketCategory::Technical);
    assert_eq!(result.missing_fields, vec!["error_details".to_string()]);
    assert_eq!(result.decision, AgentDecision::AskedForInfo);
    assert_eq!(result.new_status, TicketStatus::WaitingForUser);

    let view = h.intake.ticket_view(ticket.id).await.unwrap();
    assert_eq!(view.status, TicketStatus::WaitingForUser);
    assert_eq!(view.required_fields_missing.as_deref(), Some("error_details"));
    assert_eq!(view.missing_fields, Some(vec!["error_details".to_string()]));
    assert_eq!(
        view.latest_note.as_deref(),
        Some("Please provide additional information: error_details")
    );
}

#[tokio::test]
async fn missing_fields_go_to_review_when_auto_ask_is_off() {
    let h = harness().await;
    h.store
        .save_settings(&AgentSettings {
            enable_auto_ask_clarifying_questions: false,
            ..AgentSettings::default()
        })
        .await
        .unwrap();
    let ticket = h
        .intake
        .enqueue_ticket("CUST-106", "Crash", "error on boot")
        .await
        .unwrap();

    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.decision, AgentDecision::SentToReview);
    let view = h.intake.ticket_view(ticket.id).await.unwrap();
    assert_eq!(
        view.latest_note.as_deref(),
        Some("Missing required fields (error_details) and auto-ask is disabled.")
    );
}

// ---------------------------------------------------------------------------
// Empty queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_queue_is_a_no_op() {
    let h = harness().await;
    assert!(h.agent.step().await.unwrap().is_none());

    let snapshot = h.store.queue_snapshot().await.unwrap();
    assert_eq!(snapshot.total, 0);
    assert!(h.store.list_policy_parameters().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Other policy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmatched_ticket_is_reviewed_for_low_confidence() {
    let h = harness().await;
    h.intake
        .enqueue_ticket("CUST-107", "Hello", "Just wanted to say thanks to the team")
        .await
        .unwrap();

    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.category, TicketCategory::Other);
    assert_eq!(result.priority, TicketPriority::Medium);
    assert!((result.confidence - 0.60).abs() < 1e-9);
    assert_eq!(result.decision, AgentDecision::SentToReview);
}

#[tokio::test]
async fn auto_assign_disabled_sends_to_review() {
    let h = harness().await;
    h.store
        .save_settings(&AgentSettings {
            enable_auto_assign: false,
            ..AgentSettings::default()
        })
        .await
        .unwrap();
    let ticket = h
        .intake
        .enqueue_ticket("CUST-108", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();

    let result = h.agent.step().await.unwrap().unwrap();
    assert_eq!(result.decision, AgentDecision::SentToReview);
    let view = h.intake.ticket_view(ticket.id).await.unwrap();
    assert_eq!(view.latest_note.as_deref(), Some("Auto-assign is disabled."));
    assert_eq!(view.assigned_team, None);
}

struct NoTeams;

impl Router for NoTeams {
    fn route(&self, _category: TicketCategory) -> Option<SupportTeam> {
        None
    }
}

#[tokio::test]
async fn unresolved_team_degrades_to_review() {
    let h = harness().await;
    let agent = TicketAgent::new(Arc::clone(&h.store)).with_router(Arc::new(NoTeams));
    let ticket = h
        .intake
        .enqueue_ticket("CUST-109", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();

    let result = agent.step().await.unwrap().unwrap();
    assert_eq!(result.decision, AgentDecision::SentToReview);
    assert_eq!(result.new_status, TicketStatus::NeedsReview);
    assert_eq!(result.team, None);

    let events = h.store.list_events(ticket.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].description,
        "Routing failed (team was null). Sent to review."
    );
}

struct AlwaysBilling;

impl Classifier for AlwaysBilling {
    fn classify(&self, _ticket: &Ticket, _settings: &AgentSettings) -> hd_agent::Classification {
        hd_agent::Classification {
            category: TicketCategory::Billing,
            priority: TicketPriority::High,
            confidence: 0.9,
            missing_fields: Vec::new(),
            explanation: "fixed".into(),
        }
    }
}

#[tokio::test]
async fn classifier_is_replaceable() {
    let h = harness().await;
    let agent = TicketAgent::new(Arc::clone(&h.store)).with_classifier(Arc::new(AlwaysBilling));
    h.intake
        .enqueue_ticket("CUST-110", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();

    let result = agent.step().await.unwrap().unwrap();
    assert_eq!(result.team, Some(SupportTeam::BillingTeam));
    assert_eq!(result.explanation, "fixed");
}

#[tokio::test]
async fn seeding_samples_twice_is_a_no_op() {
    let h = harness().await;
    let seeded = h.intake.seed_samples().await.unwrap();
    assert_eq!(seeded.len(), SAMPLE_TICKETS.len());
    assert!(h.intake.seed_samples().await.unwrap().is_empty());
    assert_eq!(h.store.queue_snapshot().await.unwrap().queued, 5);
}

#[tokio::test]
async fn each_ticket_is_processed_once_and_in_order() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap(),
    ));
    let store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new_in_memory()
            .await
            .unwrap()
            .with_clock(clock.clone()),
    );
    let intake = Intake::new(Arc::clone(&store), clock.clone());
    let h = Harness {
        agent: TicketAgent::new(Arc::clone(&store)),
        feedback: FeedbackService::new(Arc::clone(&store), clock.clone()),
        intake,
        store,
    };

    // Enqueue in reverse sample order, one second apart.
    let mut seeded = Vec::new();
    for (customer_id, subject, body) in SAMPLE_TICKETS.iter().rev() {
        seeded.push(h.intake.enqueue_ticket(customer_id, subject, body).await.unwrap());
        clock.advance(Duration::seconds(1));
    }

    let mut processed = Vec::new();
    while let Some(result) = h.agent.step().await.unwrap() {
        processed.push(result);
    }
    assert_eq!(processed.len(), seeded.len());
    for (result, ticket) in processed.iter().zip(&seeded) {
        assert_eq!(result.ticket_id, ticket.id, "oldest ticket first");
    }

    let snapshot = h.store.queue_snapshot().await.unwrap();
    assert_eq!(snapshot.queued, 0);
    assert_eq!(snapshot.processing, 0);
    assert_eq!(
        snapshot.assigned + snapshot.needs_review + snapshot.waiting_for_user,
        5
    );

    for result in &processed {
        let events = h.store.list_events(result.ticket_id).await.unwrap();
        assert_eq!(events.len(), 1, "one event per processed ticket");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_agents_share_one_ticket_at_most_once() {
    let h = harness().await;
    h.intake
        .enqueue_ticket("CUST-111", CRASH_SUBJECT, CRASH_BODY)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let agent = TicketAgent::new(Arc::clone(&h.store));
        handles.push(tokio::spawn(async move { agent.step().await }));
    }
    let mut processed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            processed += 1;
        }
    }
    assert_eq!(processed, 1);
}
