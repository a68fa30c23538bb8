//! Grading requests, errors and outcomes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::InferenceError;
use crate::ticket::TicketError;

/// Requester name used when none is given.
pub const ANONYMOUS_REQUESTER: &str = "Anonymous";

/// Callback invoked with `(ticket_id, event)` whenever a ticket changes.
///
/// Events are `processing`, `completed`, `failed`, or `<subtask>:<status>`.
pub type TicketUpdateCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// A submission to grade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub problem_id: String,
    #[serde(default)]
    pub requester_name: Option<String>,
    #[serde(default)]
    pub submission_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_override: Option<String>,
}

/// Errors raised while grading.
#[derive(Debug, Error)]
pub enum GradingError {
    /// The submission was rejected before any ticket was created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not every subtask could be enqueued; the ticket was marked failed.
    #[error("dispatch failed for ticket {ticket_id}: {reason}")]
    Dispatch { ticket_id: String, reason: String },

    /// Inference or output validation failed for one subtask.
    #[error("subtask inference failed: {0}")]
    SubtaskInference(String),

    /// The ticket store could not be read or written.
    #[error("ticket store error: {0}")]
    StoreWrite(#[from] TicketError),

    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    /// A standalone inference call failed.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// What a call to the aggregator's completeness check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// This call wrote the result.
    Finalized { score: u8 },
    /// Some subtask has not reached a final state yet.
    Incomplete,
    /// Another finalizer owns the transition.
    RaceLost,
    /// The ticket had already left `processing`.
    AlreadyFinal,
}

impl FinalizeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeOutcome::Finalized { .. } => "finalized",
            FinalizeOutcome::Incomplete => "incomplete",
            FinalizeOutcome::RaceLost => "race_lost",
            FinalizeOutcome::AlreadyFinal => "already_final",
        }
    }
}
