use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::TaskId;
use crate::error::{CycleError, ValidationError};
use crate::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => ApiError::Validation(e),
            Error::Cycle(e) => ApiError::Cycle(e),
            Error::WorkflowNotFound(id) => ApiError::NotFound(format!("Workflow not found: {}", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ApiError::Cycle(_) => (StatusCode::BAD_REQUEST, "cycle"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let task_ids = match &self {
            ApiError::Validation(e) => e.task_ids(),
            // The reported task lies on the cycle; list it first.
            ApiError::Cycle(e) => {
                let mut ids = vec![e.task.clone()];
                ids.extend(e.cycle.iter().filter(|id| **id != e.task).cloned());
                ids
            }
            _ => Vec::new(),
        };

        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: error_type.to_string(),
            message: self.to_string(),
            task_ids,
        };
        (status_code, Json(body)).into_response()
    }
}
