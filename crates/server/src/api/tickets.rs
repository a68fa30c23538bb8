//! Ticket API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use gradeflow_core::{
    GradingError, SubmitRequest, SubtaskKind, SubtaskStatus, Ticket, TicketFilter, TicketStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Filter by requester
    pub requester: Option<String>,
    /// Maximum number of tickets to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for an accepted submission
#[derive(Debug, Serialize)]
pub struct SubmitTicketResponse {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub problem_id: String,
    pub requester_name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct SubtaskResponse {
    pub status: SubtaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub updated_at: String,
}

/// Response for ticket reads
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: String,
    pub problem_id: String,
    pub requester_name: String,
    pub status: TicketStatus,
    pub subtasks: BTreeMap<SubtaskKind, SubtaskResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrong_problem: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        let subtasks = ticket
            .subtasks
            .into_iter()
            .map(|(kind, record)| {
                (
                    kind,
                    SubtaskResponse {
                        status: record.status,
                        data: record.data,
                        error: record.error,
                        attempts: record.attempts,
                        updated_at: record.updated_at.to_rfc3339(),
                    },
                )
            })
            .collect();
        let result = ticket.result;

        Self {
            id: ticket.id,
            problem_id: ticket.problem_id,
            requester_name: ticket.requester_name,
            status: ticket.status,
            subtasks,
            score: result.as_ref().map(|r| r.score),
            summary: result.as_ref().map(|r| r.summary.clone()),
            report: result.as_ref().and_then(|r| r.report.clone()),
            wrong_problem: result.as_ref().map(|r| r.wrong_problem),
            failure: ticket.failure,
            created_at: ticket.created_at.to_rfc3339(),
            updated_at: ticket.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<TicketResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TicketErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
}

impl TicketErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ticket_id: None,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a submission and fan its subtasks out to the workers.
pub async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitTicketResponse>), impl IntoResponse> {
    match state.dispatcher().submit(body).await {
        Ok(ticket) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitTicketResponse {
                ticket_id: ticket.id,
                status: ticket.status,
                problem_id: ticket.problem_id,
                requester_name: ticket.requester_name,
                created_at: ticket.created_at.to_rfc3339(),
            }),
        )),
        Err(GradingError::Validation(message)) => Err((
            StatusCode::BAD_REQUEST,
            Json(TicketErrorResponse::new(message)),
        )),
        Err(GradingError::Dispatch { ticket_id, reason }) => {
            warn!(ticket_id = %ticket_id, reason = %reason, "Submission could not be dispatched");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(TicketErrorResponse {
                    error: reason,
                    ticket_id: Some(ticket_id),
                }),
            ))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TicketErrorResponse::new(e.to_string())),
        )),
    }
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, impl IntoResponse> {
    match state.ticket_store().get(&id) {
        Ok(Some(ticket)) => Ok(Json(TicketResponse::from(ticket))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(TicketErrorResponse::new(format!("Ticket not found: {}", id))),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TicketErrorResponse::new(e.to_string())),
        )),
    }
}

/// List tickets with optional filtering
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<ListTicketsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = TicketFilter::new().with_limit(limit).with_offset(offset);

    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        match status.parse::<TicketStatus>() {
            Ok(status) => filter = filter.with_status(status),
            Err(e) => {
                return Err((StatusCode::BAD_REQUEST, Json(TicketErrorResponse::new(e))));
            }
        }
    }

    if let Some(requester) = params.requester.filter(|r| !r.is_empty()) {
        filter = filter.with_requester(requester);
    }

    let tickets = match state.ticket_store().list(&filter) {
        Ok(tickets) => tickets,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TicketErrorResponse::new(e.to_string())),
            ));
        }
    };

    let total = match state.ticket_store().count(&filter) {
        Ok(count) => count,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TicketErrorResponse::new(e.to_string())),
            ));
        }
    };

    Ok(Json(ListTicketsResponse {
        tickets: tickets.into_iter().map(TicketResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}
