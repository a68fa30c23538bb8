//! Subtask worker: runs one analysis per queue delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::ProblemCatalog;
use crate::inference::{InferenceClient, InferenceRequest, MediaPayload};
use crate::metrics;
use crate::queue::{HandlerError, SubtaskHandler, SubtaskMessage};
use crate::ticket::{SubtaskRecord, TicketError, TicketStatus, TicketStore};

use super::aggregator::Aggregator;
use super::findings::normalize;
use super::prompts::subtask_prompt;
use super::types::{GradingError, TicketUpdateCallback};
use super::GradingConfig;

/// Handles subtask deliveries from the task queue.
///
/// Every step is safe to repeat: a redelivered message for a subtask that
/// already reached a final state skips the analysis and only re-runs the
/// completeness check.
pub struct GradingWorker {
    store: Arc<dyn TicketStore>,
    catalog: Arc<dyn ProblemCatalog>,
    inference: Arc<dyn InferenceClient>,
    aggregator: Arc<Aggregator>,
    config: GradingConfig,
    on_update: Option<TicketUpdateCallback>,
}

impl GradingWorker {
    pub fn new(
        store: Arc<dyn TicketStore>,
        catalog: Arc<dyn ProblemCatalog>,
        inference: Arc<dyn InferenceClient>,
        aggregator: Arc<Aggregator>,
        config: GradingConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            inference,
            aggregator,
            config,
            on_update: None,
        }
    }

    /// Set a callback for ticket updates.
    pub fn with_update_callback(mut self, callback: TicketUpdateCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    /// Process one delivery.
    pub async fn process(&self, message: &SubtaskMessage) -> Result<(), GradingError> {
        let ticket_id = message.ticket_id.as_str();
        let kind = message.subtask;

        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or_else(|| GradingError::TicketNotFound(ticket_id.to_string()))?;

        if ticket.status == TicketStatus::Failed {
            info!("Ticket {} already failed, skipping {}", ticket_id, kind);
            return Ok(());
        }

        let record = self.store.mark_subtask_processing(ticket_id, kind)?;

        if record.status.is_terminal() {
            debug!(
                "Subtask {} of ticket {} already {}, skipping analysis",
                kind,
                ticket_id,
                record.status.as_str()
            );
            metrics::SUBTASKS
                .with_label_values(&[kind.as_str(), "skipped"])
                .inc();
        } else {
            info!(
                "Running {} for ticket {} (attempt {})",
                kind, ticket_id, record.attempts
            );
            self.notify(ticket_id, &format!("{}:processing", kind));

            let record = self.analyse_and_record(message).await?;

            metrics::SUBTASKS
                .with_label_values(&[kind.as_str(), record.status.as_str()])
                .inc();
            self.notify(ticket_id, &format!("{}:{}", kind, record.status.as_str()));
        }

        self.aggregator.try_finalize(ticket_id).await?;
        Ok(())
    }

    /// Run the analysis and write its outcome. Inference failures are
    /// recorded on the subtask; only store failures surface as errors.
    async fn analyse_and_record(
        &self,
        message: &SubtaskMessage,
    ) -> Result<SubtaskRecord, GradingError> {
        let ticket_id = message.ticket_id.as_str();
        let kind = message.subtask;

        let record = match self.analyse(message).await {
            Ok(data) => self.store.complete_subtask(ticket_id, kind, data)?,
            Err(e) => {
                warn!("{} failed for ticket {}: {}", kind, ticket_id, e);
                self.store.fail_subtask(ticket_id, kind, &e.to_string())?
            }
        };

        Ok(record)
    }

    async fn analyse(&self, message: &SubtaskMessage) -> Result<Value, GradingError> {
        let problem = self
            .catalog
            .lookup(&message.problem_id)
            .with_rubric_override(message.rubric_override.as_deref());

        let media = MediaPayload::from_data_url(&message.submission_ref);
        let submission_text = match media {
            Some(_) => None,
            None => Some(message.submission_ref.as_str()),
        };

        let prompt = subtask_prompt(message.subtask, &problem, submission_text, &self.config);
        let request = InferenceRequest::structured(
            message.subtask.into(),
            prompt.instructions,
            prompt.context,
        )
        .with_media(media);

        let output = self
            .inference
            .infer(request)
            .await
            .map_err(|e| GradingError::SubtaskInference(e.to_string()))?;

        normalize(message.subtask, output.into_value()).map_err(GradingError::SubtaskInference)
    }

    fn notify(&self, ticket_id: &str, event: &str) {
        if let Some(ref callback) = self.on_update {
            callback(ticket_id, event);
        }
    }
}

#[async_trait]
impl SubtaskHandler for GradingWorker {
    async fn handle(&self, message: &SubtaskMessage) -> Result<(), HandlerError> {
        self.process(message).await.map_err(|e| match e {
            GradingError::TicketNotFound(_)
            | GradingError::StoreWrite(TicketError::NotFound(_))
            | GradingError::StoreWrite(TicketError::SubtaskNotFound { .. }) => {
                HandlerError::Drop(e.to_string())
            }
            other => HandlerError::Retry(other.to_string()),
        })
    }
}
