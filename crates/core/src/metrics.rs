//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatch (submissions accepted or rejected)
//! - Workers and aggregation (subtask outcomes, finalizations, scores)
//! - Task queue (deliveries, in-flight work)
//! - Inference (requests, latency, LLM tokens)

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
};

// =============================================================================
// Dispatch
// =============================================================================

/// Submissions total by result.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_submissions_total", "Total grading submissions"),
        &["result"], // "accepted", "rejected", "dispatch_failed"
    )
    .unwrap()
});

// =============================================================================
// Workers & Aggregation
// =============================================================================

/// Subtask outcomes by subtask and result.
pub static SUBTASKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_subtasks_total", "Total subtask outcomes"),
        &["subtask", "result"], // result: "completed", "error", "skipped"
    )
    .unwrap()
});

/// Finalization attempts by outcome.
pub static FINALIZATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gradeflow_finalizations_total",
            "Total finalization attempts",
        ),
        &["outcome"], // "finalized", "incomplete", "race_lost", "already_final"
    )
    .unwrap()
});

/// Distribution of final scores.
pub static FINAL_SCORE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("gradeflow_final_score", "Final ticket scores")
            .buckets(vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]),
    )
    .unwrap()
});

/// Report generations that failed and finalized without a report.
pub static REPORT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "gradeflow_report_failures_total",
        "Total report generations that failed",
    )
    .unwrap()
});

// =============================================================================
// Task Queue
// =============================================================================

/// Queue deliveries by result.
pub static QUEUE_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_queue_deliveries_total", "Total queue deliveries"),
        &["result"], // "acked", "retried", "dead_lettered", "dropped"
    )
    .unwrap()
});

/// Deliveries currently being handled.
pub static QUEUE_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_queue_in_flight",
        "Queue deliveries currently being handled",
    )
    .unwrap()
});

// =============================================================================
// Inference
// =============================================================================

/// Inference requests by role and status.
pub static INFERENCE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gradeflow_inference_requests_total",
            "Total inference requests",
        ),
        &["role", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Inference request duration.
pub static INFERENCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "gradeflow_inference_duration_seconds",
            "Duration of inference calls",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["role"],
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatch
        Box::new(SUBMISSIONS.clone()),
        // Workers & aggregation
        Box::new(SUBTASKS.clone()),
        Box::new(FINALIZATIONS.clone()),
        Box::new(FINAL_SCORE.clone()),
        Box::new(REPORT_FAILURES.clone()),
        // Queue
        Box::new(QUEUE_DELIVERIES.clone()),
        Box::new(QUEUE_IN_FLIGHT.clone()),
        // Inference
        Box::new(INFERENCE_REQUESTS.clone()),
        Box::new(INFERENCE_DURATION.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
