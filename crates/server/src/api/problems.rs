//! Problem catalog handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use gradeflow_core::ProblemDefinition;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProblemListResponse {
    pub problems: Vec<ProblemDefinition>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ProblemErrorResponse {
    pub error: String,
}

/// List every problem in the catalog, ordered by id.
pub async fn list_problems(State(state): State<Arc<AppState>>) -> Json<ProblemListResponse> {
    let problems = state.catalog().list();
    Json(ProblemListResponse {
        total: problems.len(),
        problems,
    })
}

pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProblemDefinition>, impl IntoResponse> {
    match state.catalog().get(&id) {
        Some(problem) => Ok(Json(problem)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ProblemErrorResponse {
                error: format!("Problem not found: {}", id),
            }),
        )),
    }
}
