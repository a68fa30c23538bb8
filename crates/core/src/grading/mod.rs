//! Grading: fan-out of a submission into analyses and fan-in of their
//! findings into a single verdict.
//!
//! The [`Dispatcher`] creates a ticket and enqueues one message per
//! subtask. Each delivery is handled by a [`GradingWorker`], which records
//! the analysis outcome and asks the [`Aggregator`] whether the ticket is
//! complete. The aggregator finalizes each ticket exactly once.

mod aggregator;
mod config;
mod dispatcher;
mod findings;
mod prompts;
mod rubric;
mod scoring;
mod types;
mod worker;

pub use aggregator::Aggregator;
pub use config::GradingConfig;
pub use dispatcher::Dispatcher;
pub use findings::{
    normalize as normalize_findings, CorrectnessFindings, FeedbackFindings, ReasoningFindings,
    SYSTEM_FAILURE_SUMMARY,
};
pub use prompts::Prompt;
pub use rubric::{RubricAdvisor, RubricSuggestionRequest, RUBRIC_TEMPERATURE};
pub use scoring::{compute_score, GradedFindings, ScoreBreakdown, DEDUCTION_PER_ERROR};
pub use types::{
    FinalizeOutcome, GradingError, SubmitRequest, TicketUpdateCallback, ANONYMOUS_REQUESTER,
};
pub use worker::GradingWorker;
