pub mod agent;
pub mod classifier;
pub mod error;
pub mod feedback;
pub mod intake;
pub mod learning;
pub mod policy;
pub mod router;

pub use agent::{AgentStep, TickResult, TicketAgent};
pub use classifier::{Classification, Classifier, KeywordClassifier};
pub use error::{AgentError, Result};
pub use feedback::FeedbackService;
pub use intake::{Intake, TicketView, SAMPLE_TICKETS};
pub use learning::LearningEngine;
pub use policy::{decide, Decision};
pub use router::{DefaultRouter, Router};
