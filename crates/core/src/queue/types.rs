//! Queue message, seams and status types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ticket::SubtaskKind;

/// Capability to process exactly one subtask of one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskMessage {
    pub ticket_id: String,
    #[serde(rename = "subtask_name")]
    pub subtask: SubtaskKind,
    /// Opaque reference to the submitted work (often a base64 data URL).
    pub submission_ref: String,
    pub problem_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_override: Option<String>,
}

/// Errors returned when handing a message to the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full,

    /// The queue was stopped and accepts no more messages.
    #[error("queue is closed")]
    Closed,

    /// Backend-specific failure.
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Outcome a handler reports for a delivery it could not acknowledge.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient failure; redeliver after backoff.
    #[error("retry requested: {0}")]
    Retry(String),

    /// The message can never succeed; acknowledge it without retrying.
    #[error("message dropped: {0}")]
    Drop(String),
}

/// At-least-once delivery of subtask messages.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Accept a message for eventual delivery.
    async fn enqueue(&self, message: SubtaskMessage) -> Result<(), QueueError>;
}

/// Consumer side of the queue. May see the same message more than once.
#[async_trait]
pub trait SubtaskHandler: Send + Sync {
    async fn handle(&self, message: &SubtaskMessage) -> Result<(), HandlerError>;
}

/// Snapshot of queue activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Whether deliveries are being made.
    pub running: bool,
    /// Messages waiting for a delivery slot.
    pub queued: usize,
    /// Deliveries currently inside a handler.
    pub in_flight: u64,
    /// Deliveries acknowledged by a handler.
    pub acked: u64,
    /// Redeliveries scheduled after a failure.
    pub retried: u64,
    /// Messages abandoned after the last attempt.
    pub dead_lettered: u64,
    /// Messages the handler refused outright.
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let message = SubtaskMessage {
            ticket_id: "t-1".to_string(),
            subtask: SubtaskKind::Reasoning,
            submission_ref: "data:image/png;base64,AAAA".to_string(),
            problem_id: "Q001".to_string(),
            rubric_override: None,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["subtask_name"], "reasoning");
        assert!(json.get("rubric_override").is_none());

        let parsed: SubtaskMessage = serde_json::from_str(
            r#"{"ticket_id":"t-1","subtask_name":"logic","submission_ref":"x","problem_id":"Q001"}"#,
        )
        .unwrap();
        assert_eq!(parsed.subtask, SubtaskKind::Reasoning);
    }
}
