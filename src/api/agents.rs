use axum::{extract::State, Json};

use crate::agent::AgentStatus;
use crate::api::state::AppState;

/// GET /agents
///
/// Every registered agent is checked concurrently.
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentStatus>> {
    Json(state.orchestrator.list_agents().await)
}
