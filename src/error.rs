use thiserror::Error;

use crate::core::task::TaskId;

/// Structural problems with a submitted workflow.
///
/// Raised by the descriptor store before anything runs. Every variant
/// names the offending task ids so callers can fix and resubmit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed workflow definition: {0}")]
    Malformed(String),

    #[error("Workflow has no tasks")]
    EmptyWorkflow,

    #[error("Task at position {position} has an empty id")]
    EmptyTaskId { position: usize },

    #[error("Task id '{id}' is invalid: {reason}")]
    InvalidTaskId { id: TaskId, reason: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(TaskId),

    #[error("Task '{task}' has an empty operation name")]
    EmptyOperation { task: TaskId },

    #[error("Task '{task}' targets unknown agent '{agent}'")]
    UnknownAgent { task: TaskId, agent: String },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Task '{0}' depends on itself")]
    SelfDependency(TaskId),

    #[error("Task '{task}' parameter '{param}' references unknown task in '{reference}'")]
    UnknownReference {
        task: TaskId,
        param: String,
        reference: String,
    },

    #[error(
        "Task '{task}' parameter '{param}' references '{referenced}', which is not one of its dependencies"
    )]
    ReferenceNotDependency {
        task: TaskId,
        param: String,
        referenced: TaskId,
    },
}

impl ValidationError {
    /// Task ids involved in the error, for task-level reporting.
    pub fn task_ids(&self) -> Vec<TaskId> {
        match self {
            Self::Malformed(_) | Self::EmptyWorkflow | Self::EmptyTaskId { .. } => Vec::new(),
            Self::InvalidTaskId { id, .. } | Self::DuplicateTaskId(id) | Self::SelfDependency(id) => {
                vec![id.clone()]
            }
            Self::EmptyOperation { task } | Self::UnknownAgent { task, .. } => vec![task.clone()],
            Self::UnknownDependency { task, dependency } => vec![task.clone(), dependency.clone()],
            Self::UnknownReference { task, .. } => vec![task.clone()],
            Self::ReferenceNotDependency {
                task, referenced, ..
            } => vec![task.clone(), referenced.clone()],
        }
    }
}

/// The dependency graph contains a cycle.
///
/// `task` is guaranteed to lie on the cycle; `cycle` lists the tasks along
/// it in dependency order, starting and ending at `task`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Dependency cycle detected at task '{task}': {}", format_cycle(.cycle))]
pub struct CycleError {
    pub task: TaskId,
    pub cycle: Vec<TaskId>,
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Per-task execution failures reported by the dispatch layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Agent '{agent}' unreachable: {reason}")]
    AgentUnreachable { agent: String, reason: String },

    #[error("Agent '{agent}' timed out after {timeout:?}")]
    AgentTimeout {
        agent: String,
        timeout: std::time::Duration,
    },

    #[error("Agent '{agent}' rejected the request: {reason}")]
    AgentRejected { agent: String, reason: String },
}

impl DispatchError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Rejections are final; unreachable agents and timeouts are transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AgentUnreachable { .. } | Self::AgentTimeout { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Cancellation requested")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
