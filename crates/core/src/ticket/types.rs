//! Core ticket data types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Subtasks
// ============================================================================

/// The fixed, closed set of analyses every ticket fans out into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    /// Checks the mathematical correctness of the submitted work.
    #[serde(alias = "formula")]
    Correctness,
    /// Checks the logical structure of the argument.
    #[serde(alias = "logic")]
    Reasoning,
    /// Produces learner-facing feedback.
    Feedback,
}

impl SubtaskKind {
    /// Every subtask a ticket is created with, in dispatch order.
    pub const ALL: [SubtaskKind; 3] = [
        SubtaskKind::Correctness,
        SubtaskKind::Reasoning,
        SubtaskKind::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskKind::Correctness => "correctness",
            SubtaskKind::Reasoning => "reasoning",
            SubtaskKind::Feedback => "feedback",
        }
    }
}

impl fmt::Display for SubtaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correctness" | "formula" => Ok(SubtaskKind::Correctness),
            "reasoning" | "logic" => Ok(SubtaskKind::Reasoning),
            "feedback" => Ok(SubtaskKind::Feedback),
            other => Err(format!("unknown subtask: {}", other)),
        }
    }
}

/// Lifecycle of a single subtask record.
///
/// Transitions are monotonic: `pending -> processing -> {completed | error}`.
/// A terminal record is never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::Processing => "processing",
            SubtaskStatus::Completed => "completed",
            SubtaskStatus::Error => "error",
        }
    }

    /// Returns true once the record holds a final outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Completed | SubtaskStatus::Error)
    }
}

impl FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubtaskStatus::Pending),
            "processing" => Ok(SubtaskStatus::Processing),
            "completed" => Ok(SubtaskStatus::Completed),
            "error" => Ok(SubtaskStatus::Error),
            other => Err(format!("unknown subtask status: {}", other)),
        }
    }
}

/// Per-subtask slot inside a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRecord {
    pub status: SubtaskStatus,
    /// Structured findings, present once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description, present once errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How many times a worker picked this subtask up.
    #[serde(default)]
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl SubtaskRecord {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: SubtaskStatus::Pending,
            data: None,
            error: None,
            attempts: 0,
            updated_at: now,
        }
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// Overall ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Subtasks are being worked on.
    Processing,
    /// All subtasks finished and a result was written.
    Completed,
    /// Dispatch could not enqueue every subtask; no result will follow.
    Failed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Processing => "processing",
            TicketStatus::Completed => "completed",
            TicketStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Processing)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(TicketStatus::Processing),
            "completed" => Ok(TicketStatus::Completed),
            "failed" => Ok(TicketStatus::Failed),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// Final verdict written once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketResult {
    /// Final score, 0 to 100.
    pub score: u8,
    /// Short learner-facing summary.
    pub summary: String,
    /// Rendered report document, absent when generation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// The submission answered a different problem.
    #[serde(default)]
    pub wrong_problem: bool,
    /// At least one analysis ended in error.
    #[serde(default)]
    pub has_error: bool,
}

/// A grading ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub problem_id: String,
    pub requester_name: String,
    pub status: TicketStatus,
    /// One record per [`SubtaskKind`]; the key set never changes.
    pub subtasks: BTreeMap<SubtaskKind, SubtaskRecord>,
    /// Present if and only if `status` is `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TicketResult>,
    /// Why dispatch failed, for `failed` tickets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Returns true when every subtask holds a final outcome.
    pub fn all_subtasks_terminal(&self) -> bool {
        SubtaskKind::ALL.iter().all(|kind| {
            self.subtasks
                .get(kind)
                .map(|record| record.status.is_terminal())
                .unwrap_or(false)
        })
    }

    pub fn subtask(&self, kind: SubtaskKind) -> Option<&SubtaskRecord> {
        self.subtasks.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_with(statuses: &[(SubtaskKind, SubtaskStatus)]) -> Ticket {
        let now = Utc::now();
        let mut subtasks = BTreeMap::new();
        for (kind, status) in statuses {
            let mut record = SubtaskRecord::pending(now);
            record.status = *status;
            subtasks.insert(*kind, record);
        }
        Ticket {
            id: "t-1".to_string(),
            problem_id: "Q001".to_string(),
            requester_name: "Anonymous".to_string(),
            status: TicketStatus::Processing,
            subtasks,
            result: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_subtask_kind_accepts_legacy_names() {
        let kind: SubtaskKind = serde_json::from_str("\"formula\"").unwrap();
        assert_eq!(kind, SubtaskKind::Correctness);
        let kind: SubtaskKind = "logic".parse().unwrap();
        assert_eq!(kind, SubtaskKind::Reasoning);
        assert_eq!(
            serde_json::to_string(&SubtaskKind::Correctness).unwrap(),
            "\"correctness\""
        );
    }

    #[test]
    fn test_subtask_status_terminal() {
        assert!(!SubtaskStatus::Pending.is_terminal());
        assert!(!SubtaskStatus::Processing.is_terminal());
        assert!(SubtaskStatus::Completed.is_terminal());
        assert!(SubtaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_all_subtasks_terminal() {
        let ticket = ticket_with(&[
            (SubtaskKind::Correctness, SubtaskStatus::Completed),
            (SubtaskKind::Reasoning, SubtaskStatus::Error),
            (SubtaskKind::Feedback, SubtaskStatus::Processing),
        ]);
        assert!(!ticket.all_subtasks_terminal());

        let ticket = ticket_with(&[
            (SubtaskKind::Correctness, SubtaskStatus::Completed),
            (SubtaskKind::Reasoning, SubtaskStatus::Error),
            (SubtaskKind::Feedback, SubtaskStatus::Completed),
        ]);
        assert!(ticket.all_subtasks_terminal());
    }

    #[test]
    fn test_missing_subtask_is_not_terminal() {
        let ticket = ticket_with(&[
            (SubtaskKind::Correctness, SubtaskStatus::Completed),
            (SubtaskKind::Reasoning, SubtaskStatus::Completed),
        ]);
        assert!(!ticket.all_subtasks_terminal());
    }

    #[test]
    fn test_ticket_serializes_subtasks_by_name() {
        let ticket = ticket_with(&[(SubtaskKind::Feedback, SubtaskStatus::Pending)]);
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["subtasks"]["feedback"]["status"], "pending");
        assert!(json.get("result").is_none());
    }
}
