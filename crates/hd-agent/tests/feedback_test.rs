use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use hd_agent::learning::{MAX_THRESHOLD, MIN_THRESHOLD};
use hd_agent::{AgentError, FeedbackService, Intake, TicketAgent};
use hd_core::clock::{Clock, ManualClock};
use hd_core::store::{SqliteTicketStore, TicketStore};
use hd_core::types::*;
use uuid::Uuid;

async fn setup() -> (Arc<dyn TicketStore>, Arc<ManualClock>, Intake, FeedbackService) {
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
    let feedback = FeedbackService::new(Arc::clone(&store), clock.clone());
    (store, clock, intake, feedback)
}

#[tokio::test]
async fn feedback_on_unknown_ticket_is_not_found() {
    let (_store, _clock, _intake, feedback) = setup().await;
    let missing = Uuid::new_v4();
    let err = feedback
        .submit_feedback(missing, TicketCategory::Billing, TicketPriority::Low, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::TicketNotFound(id) if id == missing));
}

#[tokio::test]
async fn unclassified_ticket_compares_as_other_medium() {
    let (store, _clock, intake, feedback) = setup().await;
    let ticket = intake
        .enqueue_ticket("CUST-200", "Question", "Where is my order?")
        .await
        .unwrap();

    let entry = feedback
        .submit_feedback(ticket.id, TicketCategory::Other, TicketPriority::Medium, Some("fine".into()))
        .await
        .unwrap();
    assert_eq!(entry.original_category, TicketCategory::Other);
    assert_eq!(entry.original_priority, TicketPriority::Medium);
    assert!(entry.was_category_correct);
    assert!(entry.was_priority_correct);

    // Correct feedback lowers the Other threshold from the global 0.70.
    let row = store
        .get_policy_parameter(TicketCategory::Other)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.confidence_threshold, 0.68);
    assert_eq!(row.correct_count, 1);

    // Nothing to correct: the ticket stays unclassified.
    let stored = store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.category, None);

    let entries = store.list_feedback(ticket.id).await.unwrap();
    assert_eq!(entries, vec![entry]);
}

#[tokio::test]
async fn wrong_priority_only_corrects_ticket_but_lowers_threshold() {
    let (store, _clock, intake, feedback) = setup().await;
    let ticket = intake
        .enqueue_ticket(
            "CUST-201",
            "Application crash on startup",
            "The app crashed right after the splash screen appears.",
        )
        .await
        .unwrap();
    TicketAgent::new(Arc::clone(&store)).step().await.unwrap().unwrap();

    let entry = feedback
        .submit_feedback(ticket.id, TicketCategory::Technical, TicketPriority::Urgent, None)
        .await
        .unwrap();
    assert!(entry.was_category_correct);
    assert!(!entry.was_priority_correct);

    let stored = store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.category, Some(TicketCategory::Technical));
    assert_eq!(stored.priority, Some(TicketPriority::Urgent));

    let row = store
        .get_policy_parameter(TicketCategory::Technical)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.confidence_threshold, 0.68);
}

#[tokio::test]
async fn policy_row_is_seeded_from_current_global_threshold() {
    let (store, clock, intake, feedback) = setup().await;
    store
        .save_settings(&AgentSettings {
            confidence_threshold: 0.6,
            ..AgentSettings::default()
        })
        .await
        .unwrap();
    let ticket = intake
        .enqueue_ticket("CUST-202", "Invoice", "Please resend my invoice")
        .await
        .unwrap();
    store
        .apply_correction(ticket.id, TicketCategory::Billing, TicketPriority::Medium)
        .await
        .unwrap();

    clock.advance(Duration::minutes(3));
    feedback
        .submit_feedback(ticket.id, TicketCategory::Account, TicketPriority::Medium, None)
        .await
        .unwrap();

    let row = store
        .get_policy_parameter(TicketCategory::Billing)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.confidence_threshold, 0.65);
    assert_eq!(row.last_updated, clock.now());
}

#[tokio::test]
async fn threshold_stays_in_bounds_for_any_feedback_sequence() {
    let (store, _clock, intake, feedback) = setup().await;
    let ticket = intake
        .enqueue_ticket("CUST-203", "Login", "Cannot sign in")
        .await
        .unwrap();
    store
        .apply_correction(ticket.id, TicketCategory::Account, TicketPriority::High)
        .await
        .unwrap();

    // Deterministic mix: long wrong streak, long correct streak, then alternating.
    let pattern: Vec<bool> = std::iter::repeat(false)
        .take(12)
        .chain(std::iter::repeat(true).take(40))
        .chain((0..20).map(|i| i % 3 == 0))
        .collect();

    let learning = feedback.learning();
    let mut previous = learning
        .effective_threshold(TicketCategory::Account)
        .await
        .unwrap();
    for category_correct in pattern {
        // Feedback always compares against Account; re-assert it after each correction.
        store
            .apply_correction(ticket.id, TicketCategory::Account, TicketPriority::High)
            .await
            .unwrap();
        let correct = if category_correct {
            TicketCategory::Account
        } else {
            TicketCategory::Billing
        };
        feedback
            .submit_feedback(ticket.id, correct, TicketPriority::High, None)
            .await
            .unwrap();

        let current = learning
            .effective_threshold(TicketCategory::Account)
            .await
            .unwrap();
        assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&current));
        if category_correct {
            assert!(current < previous || current == MIN_THRESHOLD);
        } else {
            assert!(current > previous || current == MAX_THRESHOLD);
        }
        previous = current;
    }

    let row = store
        .get_policy_parameter(TicketCategory::Account)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.total_feedback_count, 72);
    assert_eq!(row.correct_count + row.incorrect_count, 72);
}
