use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, problems, rubrics, tickets, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tickets
        .route("/tickets", post(tickets::submit_ticket))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/{id}", get(tickets::get_ticket))
        // Queue
        .route("/queue/status", get(handlers::queue_status))
        // Problem catalog
        .route("/problems", get(problems::list_problems))
        .route("/problems/{id}", get(problems::get_problem))
        // Rubric drafting
        .route("/rubrics/suggest", post(rubrics::suggest_rubric))
        // Live ticket updates
        .route("/ws", get(ws::ws_handler))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
