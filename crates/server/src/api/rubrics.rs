//! Rubric suggestion handler.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use gradeflow_core::{GradingError, RubricSuggestionRequest};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RubricSuggestionResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RubricErrorResponse {
    pub error: String,
}

/// Draft grading criteria for a past exam.
pub async fn suggest_rubric(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RubricSuggestionRequest>,
) -> Result<Json<RubricSuggestionResponse>, impl IntoResponse> {
    match state.rubric_advisor().suggest(&body).await {
        Ok(text) => Ok(Json(RubricSuggestionResponse { text })),
        Err(GradingError::Validation(message)) => Err((
            StatusCode::BAD_REQUEST,
            Json(RubricErrorResponse { error: message }),
        )),
        Err(e) => {
            warn!(error = %e, "Rubric suggestion failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(RubricErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}
