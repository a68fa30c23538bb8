//! Fan-out: creates a ticket and enqueues one message per subtask.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::metrics;
use crate::queue::{QueueConfig, QueueError, SubtaskMessage, TaskQueue};
use crate::ticket::{CreateTicketRequest, SubtaskKind, Ticket, TicketStore};

use super::types::{GradingError, SubmitRequest, TicketUpdateCallback, ANONYMOUS_REQUESTER};

/// Accepts submissions and fans them out to the task queue.
pub struct Dispatcher {
    store: Arc<dyn TicketStore>,
    queue: Arc<dyn TaskQueue>,
    enqueue_attempts: u32,
    enqueue_backoff: Duration,
    on_update: Option<TicketUpdateCallback>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TicketStore>, queue: Arc<dyn TaskQueue>, config: &QueueConfig) -> Self {
        Self {
            store,
            queue,
            enqueue_attempts: config.enqueue_attempts.max(1),
            enqueue_backoff: Duration::from_millis(config.enqueue_backoff_ms),
            on_update: None,
        }
    }

    /// Set a callback for ticket updates.
    pub fn with_update_callback(mut self, callback: TicketUpdateCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    /// Create a ticket for the submission and dispatch its subtasks.
    ///
    /// Returns the ticket as created. A blank submission reference is
    /// rejected before anything is stored. If any subtask cannot be
    /// enqueued, the ticket is marked failed and [`GradingError::Dispatch`]
    /// is returned.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Ticket, GradingError> {
        let submission_ref = request.submission_ref.trim();
        if submission_ref.is_empty() {
            metrics::SUBMISSIONS.with_label_values(&["rejected"]).inc();
            return Err(GradingError::Validation(
                "submission_ref is required".to_string(),
            ));
        }

        let requester_name = request
            .requester_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS_REQUESTER)
            .to_string();

        let rubric_override = request
            .rubric_override
            .filter(|text| !text.trim().is_empty());

        let ticket = self.store.create(CreateTicketRequest {
            problem_id: request.problem_id.clone(),
            requester_name,
        })?;

        info!(
            "Ticket {} created for problem {} by {}",
            ticket.id, ticket.problem_id, ticket.requester_name
        );
        self.notify(&ticket.id, "processing");

        let messages = SubtaskKind::ALL.map(|kind| SubtaskMessage {
            ticket_id: ticket.id.clone(),
            subtask: kind,
            submission_ref: submission_ref.to_string(),
            problem_id: request.problem_id.clone(),
            rubric_override: rubric_override.clone(),
        });

        let results = join_all(messages.into_iter().map(|m| self.enqueue_with_retry(m))).await;

        let failures: Vec<String> = results
            .into_iter()
            .zip(SubtaskKind::ALL)
            .filter_map(|(result, kind)| result.err().map(|e| format!("{}: {}", kind, e)))
            .collect();

        if failures.is_empty() {
            metrics::SUBMISSIONS.with_label_values(&["accepted"]).inc();
            return Ok(ticket);
        }

        let reason = format!("failed to enqueue subtasks ({})", failures.join("; "));
        error!("Dispatch of ticket {} failed: {}", ticket.id, reason);
        metrics::SUBMISSIONS
            .with_label_values(&["dispatch_failed"])
            .inc();

        match self.store.mark_failed(&ticket.id, &reason) {
            Ok(true) => self.notify(&ticket.id, "failed"),
            Ok(false) => warn!("Ticket {} was already terminal when dispatch failed", ticket.id),
            Err(e) => error!("Failed to mark ticket {} as failed: {}", ticket.id, e),
        }

        Err(GradingError::Dispatch {
            ticket_id: ticket.id,
            reason,
        })
    }

    async fn enqueue_with_retry(&self, message: SubtaskMessage) -> Result<(), QueueError> {
        let mut attempt = 1;
        loop {
            match self.queue.enqueue(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.enqueue_attempts => {
                    warn!(
                        "Enqueue of {} for ticket {} failed (attempt {}/{}): {}",
                        message.subtask, message.ticket_id, attempt, self.enqueue_attempts, e
                    );
                    tokio::time::sleep(self.enqueue_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn notify(&self, ticket_id: &str, event: &str) {
        if let Some(ref callback) = self.on_update {
            callback(ticket_id, event);
        }
    }
}
