//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the grading server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Ticket and queue gauges (collected at scrape time)
//!
//! Core grading, queue and inference metrics are registered alongside.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::error;

use gradeflow_core::{TicketFilter, TicketStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "gradeflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "gradeflow_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gradeflow_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "gradeflow_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Ticket & Queue Metrics (collected dynamically)
// =============================================================================

/// Tickets by current status.
pub static TICKETS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("gradeflow_tickets_by_status", "Current ticket count by status"),
        &["status"],
    )
    .unwrap()
});

/// Task queue running state (1 = running, 0 = stopped).
pub static QUEUE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_queue_running",
        "Whether the task queue is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Messages waiting for delivery.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_queue_depth",
        "Messages waiting for delivery",
    )
    .unwrap()
});

/// Messages that exhausted their delivery attempts.
pub static QUEUE_DEAD_LETTERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gradeflow_queue_dead_letters",
        "Messages dead-lettered since startup",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // HTTP
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        // WebSocket
        Box::new(WS_CONNECTIONS_ACTIVE.clone()),
        Box::new(WS_CONNECTIONS_TOTAL.clone()),
        Box::new(WS_MESSAGES_SENT.clone()),
        Box::new(WS_LAG_EVENTS.clone()),
        // Tickets & queue
        Box::new(TICKETS_BY_STATUS.clone()),
        Box::new(QUEUE_RUNNING.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(QUEUE_DEAD_LETTERS.clone()),
    ];

    // Core metrics (grading, queue deliveries, inference)
    for collector in collectors
        .into_iter()
        .chain(gradeflow_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(collector) {
            error!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the store and queue at scrape
/// time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let queue = state.queue().status();
    QUEUE_RUNNING.set(if queue.running { 1 } else { 0 });
    QUEUE_DEPTH.set(queue.queued as i64);
    QUEUE_DEAD_LETTERS.set(queue.dead_lettered as i64);

    let ticket_store = state.ticket_store();
    for status in [
        TicketStatus::Processing,
        TicketStatus::Completed,
        TicketStatus::Failed,
    ] {
        let filter = TicketFilter::new().with_status(status);
        if let Ok(count) = ticket_store.count(&filter) {
            TICKETS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static PROBLEM_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/problems/[^/]+").unwrap());

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = PROBLEM_SEGMENT.replace_all(&result, "/problems/{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/tickets/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}");
    }

    #[test]
    fn test_normalize_path_problem_id() {
        assert_eq!(normalize_path("/api/v1/problems/Q001"), "/api/v1/problems/{id}");
        assert_eq!(normalize_path("/api/v1/problems"), "/api/v1/problems");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/items/42"), "/api/v1/items/{id}");
    }

    #[test]
    fn test_normalize_path_static() {
        assert_eq!(normalize_path("/api/v1/queue/status"), "/api/v1/queue/status");
    }

    #[test]
    fn test_encode_includes_core_metrics() {
        gradeflow_core::metrics::SUBMISSIONS
            .with_label_values(&["accepted"])
            .inc();
        let text = encode_metrics();
        assert!(text.contains("gradeflow_submissions_total"));
    }
}
