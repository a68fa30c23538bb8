//! Ticket storage trait and types.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::ticket::{SubtaskKind, SubtaskRecord, Ticket, TicketResult, TicketStatus};

/// Error type for ticket operations.
#[derive(Debug)]
pub enum TicketError {
    /// Ticket not found.
    NotFound(String),
    /// The ticket exists but has no record for the named subtask.
    SubtaskNotFound { ticket_id: String, subtask: String },
    /// Database error.
    Database(String),
}

impl fmt::Display for TicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketError::NotFound(id) => write!(f, "Ticket not found: {}", id),
            TicketError::SubtaskNotFound { ticket_id, subtask } => {
                write!(f, "Ticket {} has no subtask {}", ticket_id, subtask)
            }
            TicketError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for TicketError {}

/// Request to create a new ticket.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub problem_id: String,
    pub requester_name: String,
}

/// Filter for querying tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Filter by status.
    pub status: Option<TicketStatus>,
    /// Filter by requester.
    pub requester_name: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            requester_name: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_requester(mut self, requester_name: impl Into<String>) -> Self {
        self.requester_name = Some(requester_name.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable ticket storage.
///
/// Subtask writes are conditional: a record that already holds a final
/// outcome is left untouched and returned as it stands. The terminal ticket
/// transition is split into a claim and a write, both compare-and-set, so
/// exactly one caller produces the result even when several finalizers race.
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket in `processing` with every subtask `pending`.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// List tickets matching the filter, newest first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets matching the filter (ignores limit/offset).
    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Move a subtask to `processing` unless it is already terminal.
    fn mark_subtask_processing(
        &self,
        id: &str,
        kind: SubtaskKind,
    ) -> Result<SubtaskRecord, TicketError>;

    /// Record successful findings unless the subtask is already terminal.
    fn complete_subtask(
        &self,
        id: &str,
        kind: SubtaskKind,
        data: Value,
    ) -> Result<SubtaskRecord, TicketError>;

    /// Record a failure unless the subtask is already terminal.
    fn fail_subtask(
        &self,
        id: &str,
        kind: SubtaskKind,
        error: &str,
    ) -> Result<SubtaskRecord, TicketError>;

    /// Try to become the single finalizer of a ticket.
    ///
    /// Succeeds only while the ticket is `processing`, every subtask is
    /// terminal, and no other claim younger than `ttl` is held.
    fn claim_finalization(&self, id: &str, token: &str, ttl: Duration)
        -> Result<bool, TicketError>;

    /// Write the result and move the ticket to `completed`.
    ///
    /// Returns false when `token` no longer owns the claim or the ticket
    /// already left `processing`.
    fn finalize(&self, id: &str, token: &str, result: &TicketResult)
        -> Result<bool, TicketError>;

    /// Drop a claim held by `token` so another finalizer can proceed
    /// without waiting for it to go stale. Returns false if `token` no
    /// longer owns the claim.
    fn release_finalization(&self, id: &str, token: &str) -> Result<bool, TicketError>;

    /// Move a `processing` ticket to `failed`. Returns false if it was
    /// already terminal.
    fn mark_failed(&self, id: &str, reason: &str) -> Result<bool, TicketError>;
}
