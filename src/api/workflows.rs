//! Workflow submission, status and cancellation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::core::workflow::WorkflowId;
use crate::orchestrator::Submission;
use crate::workflow::types::{ExecutionResult, WorkflowStatus, WorkflowSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub workflow_id: WorkflowId,
    /// Run status when the request arrived.
    pub status: WorkflowStatus,
    /// False when the run already finished or its last batch is in flight.
    pub cancelling: bool,
}

fn parse_id(raw: &str) -> Result<WorkflowId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("Workflow not found: {}", raw)))
}

/// POST /workflows
///
/// The body is taken raw so malformed JSON is reported as a validation error.
pub async fn submit_workflow(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = state.orchestrator.submit(&body).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// GET /workflows
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    Json(state.orchestrator.list().await)
}

/// GET /workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.orchestrator.status(&id).await?))
}

/// POST /workflows/{id}/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let id = parse_id(&id)?;
    let current = state.orchestrator.cancel(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            workflow_id: id,
            status: current.status,
            cancelling: current.is_cancellable(),
        }),
    ))
}
