//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::service::RunService;

/// Create the main API router with all endpoints
pub fn create_router(service: RunService) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Triggers
        .route("/webhook", post(event::receive_webhook))
        .route("/workflow/{name}/dispatch", post(event::dispatch_workflow))
        // Runs
        .route("/runs", get(run::list_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/logs", get(run::get_run_logs))
        .route("/run/{id}/cancel", post(run::cancel_run))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
