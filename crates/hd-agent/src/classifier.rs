//! Rule-based ticket classification.
//!
//! The rules are plain case-insensitive substring checks over
//! `subject + " " + body`. They sit behind the [`Classifier`] trait so a
//! different strategy can replace them without touching the decision policy.

use hd_core::types::{AgentSettings, Ticket, TicketCategory, TicketPriority};
use serde::{Deserialize, Serialize};

pub const BASELINE_CONFIDENCE: f64 = 0.60;
pub const CATEGORY_MATCH_BONUS: f64 = 0.15;
pub const PRIORITY_MATCH_BONUS: f64 = 0.10;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Bodies shorter than this (in characters) never carry enough error detail.
pub const MIN_ERROR_BODY_CHARS: usize = 20;

pub const MISSING_ERROR_DETAILS: &str = "error_details";
pub const MISSING_STEPS_TO_REPRODUCE: &str = "steps_to_reproduce";

const ACCOUNT_KEYWORDS: &[&str] = &["login", "password", "account", "sign in"];
const BILLING_KEYWORDS: &[&str] = &["charged", "invoice", "payment", "refund"];
const TECHNICAL_KEYWORDS: &[&str] = &["error", "bug", "crash", "not working", "cannot"];

const URGENT_KEYWORDS: &[&str] = &["urgent", "asap", "down", "security"];
const HIGH_KEYWORDS: &[&str] = &["cannot", "blocked", "failed"];
const QUESTION_INDICATORS: &[&str] = &["how", "what", "where", "when", "why", "?"];

const STACK_TRACE_INDICATORS: &[&str] = &["exception", "stack", "trace", "line", "at ", "system."];
const NOT_WORKING_PHRASES: &[&str] = &["doesn't work", "does not work", "not working"];
const REPRO_CONTEXT: &[&str] = &["when", "after", "step"];

/// Output of a single classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub missing_fields: Vec<String>,
    pub explanation: String,
}

/// A strategy that scores a ticket.
pub trait Classifier: Send + Sync {
    fn classify(&self, ticket: &Ticket, settings: &AgentSettings) -> Classification;
}

/// Fixed keyword rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn classify(&self, ticket: &Ticket, _settings: &AgentSettings) -> Classification {
        let text = format!("{} {}", ticket.subject, ticket.body).to_lowercase();
        let mut explanation = Vec::new();

        let category = determine_category(&text, &mut explanation);
        let priority = determine_priority(&text, &mut explanation);
        let missing_fields = missing_fields(&ticket.body, category, &text);
        let confidence = confidence(&text, category, priority);

        let explanation = if explanation.is_empty() {
            "No strong keywords matched".to_string()
        } else {
            explanation.join("; ")
        };

        Classification {
            category,
            priority,
            confidence,
            missing_fields,
            explanation,
        }
    }
}

fn count_matches(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

fn any_match(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn category_keywords(category: TicketCategory) -> &'static [&'static str] {
    match category {
        TicketCategory::Account => ACCOUNT_KEYWORDS,
        TicketCategory::Billing => BILLING_KEYWORDS,
        TicketCategory::Technical => TECHNICAL_KEYWORDS,
        TicketCategory::Other => &[],
    }
}

fn priority_keywords(priority: TicketPriority) -> &'static [&'static str] {
    match priority {
        TicketPriority::Urgent => URGENT_KEYWORDS,
        TicketPriority::High => HIGH_KEYWORDS,
        TicketPriority::Medium | TicketPriority::Low => &[],
    }
}

/// Highest strictly-positive count wins; ties go Account, then Billing, then Technical.
fn determine_category(text: &str, explanation: &mut Vec<String>) -> TicketCategory {
    let account = count_matches(text, ACCOUNT_KEYWORDS);
    let billing = count_matches(text, BILLING_KEYWORDS);
    let technical = count_matches(text, TECHNICAL_KEYWORDS);

    let (category, hits) = if account > 0 && account >= billing && account >= technical {
        (TicketCategory::Account, account)
    } else if billing > 0 && billing >= technical {
        (TicketCategory::Billing, billing)
    } else if technical > 0 {
        (TicketCategory::Technical, technical)
    } else {
        return TicketCategory::Other;
    };

    explanation.push(format!("{category} category ({hits} keyword matches)"));
    category
}

fn determine_priority(text: &str, explanation: &mut Vec<String>) -> TicketPriority {
    let (priority, fragment) = if any_match(text, URGENT_KEYWORDS) {
        (TicketPriority::Urgent, "Urgent priority (urgent keywords detected)")
    } else if any_match(text, HIGH_KEYWORDS) {
        (
            TicketPriority::High,
            "High priority (high-priority keywords detected)",
        )
    } else if any_match(text, QUESTION_INDICATORS)
        && !text.contains("error")
        && !text.contains("bug")
    {
        (TicketPriority::Low, "Low priority (generic question)")
    } else {
        (TicketPriority::Medium, "Medium priority (default)")
    };

    explanation.push(fragment.to_string());
    priority
}

fn missing_fields(body: &str, category: TicketCategory, text: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if category == TicketCategory::Technical && text.contains("error") {
        let short_body = body.chars().count() < MIN_ERROR_BODY_CHARS;
        if short_body || !any_match(text, STACK_TRACE_INDICATORS) {
            missing.push(MISSING_ERROR_DETAILS.to_string());
        }
    }

    if any_match(text, NOT_WORKING_PHRASES) && !any_match(text, REPRO_CONTEXT) {
        missing.push(MISSING_STEPS_TO_REPRODUCE.to_string());
    }

    missing
}

fn confidence(text: &str, category: TicketCategory, priority: TicketPriority) -> f64 {
    let mut confidence = BASELINE_CONFIDENCE;
    if any_match(text, category_keywords(category)) {
        confidence += CATEGORY_MATCH_BONUS;
    }
    if any_match(text, priority_keywords(priority)) {
        confidence += PRIORITY_MATCH_BONUS;
    }
    confidence.min(MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn classify(subject: &str, body: &str) -> Classification {
        let ticket = Ticket::new("CUST-T", subject, body, Utc::now());
        KeywordClassifier.classify(&ticket, &AgentSettings::default())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn no_keywords_is_other_medium_baseline() {
        let c = classify("Hello there", "Just saying hi to the team");
        assert_eq!(c.category, TicketCategory::Other);
        assert_eq!(c.priority, TicketPriority::Medium);
        assert!(approx(c.confidence, 0.60));
        assert!(c.missing_fields.is_empty());
        assert_eq!(c.explanation, "Medium priority (default)");
    }

    #[test]
    fn account_wins_ties() {
        // one account hit ("password"), one billing hit ("refund")
        let c = classify("password", "refund");
        assert_eq!(c.category, TicketCategory::Account);
        assert!(c.explanation.starts_with("Account category (1 keyword matches)"));
    }

    #[test]
    fn billing_beats_technical_on_tie() {
        let c = classify("invoice", "bug");
        assert_eq!(c.category, TicketCategory::Billing);
    }

    #[test]
    fn highest_count_wins() {
        let c = classify("Crash", "bug and error in the invoice screen");
        assert_eq!(c.category, TicketCategory::Technical);
        assert!(c.explanation.contains("Technical category (3 keyword matches)"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let c = classify("LOGIN PROBLEM", "PASSWORD RESET");
        assert_eq!(c.category, TicketCategory::Account);
    }

    #[test]
    fn urgent_beats_high() {
        let c = classify("Site is down", "We cannot log in");
        assert_eq!(c.priority, TicketPriority::Urgent);
        assert!(c.explanation.contains("Urgent priority (urgent keywords detected)"));
    }

    #[test]
    fn high_priority_keywords() {
        let c = classify("Blocked", "Payment failed twice");
        assert_eq!(c.priority, TicketPriority::High);
        assert_eq!(c.category, TicketCategory::Billing);
        // 0.60 + 0.15 billing + 0.10 high
        assert!(approx(c.confidence, 0.85));
    }

    #[test]
    fn questions_are_low_unless_they_mention_errors() {
        let c = classify("Export", "How do I export my data?");
        assert_eq!(c.priority, TicketPriority::Low);
        assert!(c.explanation.contains("Low priority (generic question)"));

        let c = classify("Export", "Why do I get an error when exporting?");
        assert_eq!(c.priority, TicketPriority::Medium);
    }

    #[test]
    fn category_and_priority_bonuses_stack() {
        // 0.60 + 0.15 + 0.10 = 0.85, below the cap.
        let c = classify("URGENT login", "account security problem");
        assert!(approx(c.confidence, 0.85));
        assert!(c.confidence <= MAX_CONFIDENCE);
    }

    #[test]
    fn short_error_body_needs_details() {
        let c = classify("Problem", "error on save");
        assert_eq!(c.category, TicketCategory::Technical);
        assert_eq!(c.missing_fields, vec![MISSING_ERROR_DETAILS.to_string()]);
    }

    #[test]
    fn stack_trace_satisfies_error_details() {
        let c = classify(
            "Error on save",
            "NullReferenceException at SaveHandler line 42 in the stack trace",
        );
        assert!(c.missing_fields.is_empty());
    }

    #[test]
    fn body_length_counts_characters() {
        // 19 multi-byte characters: short even though it is more than 20 bytes.
        let body = "é".repeat(19);
        let c = classify("error exception", &body);
        assert_eq!(c.missing_fields, vec![MISSING_ERROR_DETAILS.to_string()]);
    }

    #[test]
    fn not_working_without_context_needs_steps() {
        let c = classify("Export", "The export button is not working");
        assert!(c
            .missing_fields
            .contains(&MISSING_STEPS_TO_REPRODUCE.to_string()));

        let c = classify("Export", "The export is not working after the update");
        assert!(!c
            .missing_fields
            .contains(&MISSING_STEPS_TO_REPRODUCE.to_string()));
    }

    #[test]
    fn both_missing_flags_can_fire() {
        let c = classify("error", "it doesn't work");
        assert_eq!(
            c.missing_fields,
            vec![
                MISSING_ERROR_DETAILS.to_string(),
                MISSING_STEPS_TO_REPRODUCE.to_string()
            ]
        );
    }
}
