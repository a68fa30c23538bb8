//! Fan-in: detects ticket completion and finalizes exactly once.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::inference::{InferenceClient, InferenceRequest, InferenceRole};
use crate::metrics;
use crate::ticket::{TicketResult, TicketStore};

use super::prompts::report_prompt;
use super::scoring::{compute_score, report_payload, GradedFindings};
use super::types::{FinalizeOutcome, GradingError, TicketUpdateCallback};
use super::GradingConfig;

/// Share of the claim TTL the report call may use. The rest is headroom
/// for the result write, so a claim never expires under a live finalizer.
const REPORT_BUDGET_DIVISOR: u32 = 2;

/// Computes the verdict of a complete ticket and writes it.
///
/// Safe to call any number of times, from any number of workers: the
/// claim/finalize pair in the store lets exactly one caller run the score
/// and report computation.
pub struct Aggregator {
    store: Arc<dyn TicketStore>,
    inference: Arc<dyn InferenceClient>,
    claim_ttl: Duration,
    report_budget: Duration,
    on_update: Option<TicketUpdateCallback>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        inference: Arc<dyn InferenceClient>,
        config: &GradingConfig,
    ) -> Self {
        let claim_ttl = Duration::from_secs(config.finalize_claim_ttl_secs);
        Self {
            store,
            inference,
            claim_ttl,
            report_budget: claim_ttl / REPORT_BUDGET_DIVISOR,
            on_update: None,
        }
    }

    /// Set a callback for ticket updates.
    pub fn with_update_callback(mut self, callback: TicketUpdateCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    /// Finalize the ticket if every subtask has reached a final state.
    pub async fn try_finalize(&self, ticket_id: &str) -> Result<FinalizeOutcome, GradingError> {
        let outcome = self.finalize_inner(ticket_id).await?;
        metrics::FINALIZATIONS
            .with_label_values(&[outcome.as_str()])
            .inc();
        Ok(outcome)
    }

    async fn finalize_inner(&self, ticket_id: &str) -> Result<FinalizeOutcome, GradingError> {
        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or_else(|| GradingError::TicketNotFound(ticket_id.to_string()))?;

        if ticket.status.is_terminal() {
            debug!("Ticket {} already {}, nothing to finalize", ticket_id, ticket.status);
            return Ok(FinalizeOutcome::AlreadyFinal);
        }

        if !ticket.all_subtasks_terminal() {
            debug!("Ticket {} still has subtasks running", ticket_id);
            return Ok(FinalizeOutcome::Incomplete);
        }

        let token = uuid::Uuid::new_v4().to_string();
        if !self
            .store
            .claim_finalization(ticket_id, &token, self.claim_ttl)?
        {
            debug!("Ticket {} is being finalized by another worker", ticket_id);
            return Ok(FinalizeOutcome::RaceLost);
        }

        // Terminal subtask records never change, so the snapshot read above
        // is the one the claim was granted on.
        let findings = GradedFindings::from_subtasks(&ticket.subtasks);
        let breakdown = compute_score(&findings);

        if breakdown.wrong_problem {
            info!("Ticket {} answers a different problem, score reset to 0", ticket_id);
        }
        if breakdown.has_error {
            warn!("Ticket {} has a failed analysis, score reset to 0", ticket_id);
        }

        let report = self.render_report(ticket_id, &findings, &breakdown).await;

        let result = TicketResult {
            score: breakdown.final_score,
            summary: findings.effective_feedback().text,
            report,
            wrong_problem: breakdown.wrong_problem,
            has_error: breakdown.has_error,
        };

        let written = match self.store.finalize(ticket_id, &token, &result) {
            Ok(written) => written,
            Err(e) => {
                if let Err(release_err) = self.store.release_finalization(ticket_id, &token) {
                    error!(
                        "Failed to release finalization claim on ticket {}: {}",
                        ticket_id, release_err
                    );
                }
                return Err(e.into());
            }
        };

        if !written {
            warn!(
                "Finalization claim on ticket {} expired before the result was written",
                ticket_id
            );
            return Ok(FinalizeOutcome::RaceLost);
        }

        metrics::FINAL_SCORE.observe(f64::from(breakdown.final_score));
        info!("Ticket {} finalized with score {}", ticket_id, breakdown.final_score);

        if let Some(ref callback) = self.on_update {
            callback(ticket_id, "completed");
        }

        Ok(FinalizeOutcome::Finalized {
            score: breakdown.final_score,
        })
    }

    /// Best-effort report rendering. Failures leave the report empty, and so
    /// does a call that outlives the report budget.
    async fn render_report(
        &self,
        ticket_id: &str,
        findings: &GradedFindings,
        breakdown: &super::scoring::ScoreBreakdown,
    ) -> Option<String> {
        let prompt = report_prompt(&report_payload(findings, breakdown));
        let request = InferenceRequest::text(InferenceRole::Report, prompt.instructions, prompt.context);

        let call = tokio::time::timeout(self.report_budget, self.inference.infer(request));
        match call.await {
            Err(_) => {
                metrics::REPORT_FAILURES.inc();
                warn!(
                    "Report generation for ticket {} exceeded {:?}, finalizing without it",
                    ticket_id, self.report_budget
                );
                None
            }
            Ok(Ok(output)) => {
                let text = output.into_text();
                if text.trim().is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Ok(Err(e)) => {
                metrics::REPORT_FAILURES.inc();
                warn!("Report generation failed for ticket {}: {}", ticket_id, e);
                None
            }
        }
    }
}
