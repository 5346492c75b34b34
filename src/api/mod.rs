//! Control API routes

pub mod agents;
pub mod error;
pub mod health;
pub mod state;
pub mod workflows;

use axum::{
    routing::{get, post},
    Router,
};

pub use error::{ApiError, ErrorBody};
pub use state::AppState;

/// Create the Control API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/workflows",
            post(workflows::submit_workflow).get(workflows::list_workflows),
        )
        .route("/workflows/{id}", get(workflows::get_workflow))
        .route("/workflows/{id}/cancel", post(workflows::cancel_workflow))
        .route("/agents", get(agents::list_agents))
        .route("/health", get(health::health_check))
        .with_state(state)
}
