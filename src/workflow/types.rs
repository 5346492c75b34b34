//! Execution result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::core::task::{TaskId, TaskStatus};
use crate::core::workflow::{Workflow, WorkflowId};
use crate::orchestration::resolver::ExecutionPlan;

/// Aggregate status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Accepted, no batch started yet.
    #[default]
    Pending,
    /// Batches are executing.
    Running,
    /// Every task succeeded.
    Succeeded,
    /// At least one sink succeeded, but not every task did.
    Partial,
    /// No sink task succeeded.
    Failed,
    /// Cancellation stopped the run before all batches executed.
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Final status for a run whose tasks are all terminal.
    ///
    /// `succeeded` only when every task succeeded. Otherwise cancellation
    /// wins if it stopped any task, then the sinks decide between
    /// `partial` and `failed`.
    pub fn aggregate(workflow: &Workflow, tasks: &[TaskResult], cancel_observed: bool) -> Self {
        if tasks.iter().all(|t| t.status == TaskStatus::Succeeded) {
            return Self::Succeeded;
        }
        if cancel_observed && tasks.iter().any(|t| t.status == TaskStatus::Cancelled) {
            return Self::Cancelled;
        }
        let sinks: HashSet<&TaskId> = workflow.sinks().into_iter().collect();
        let sink_succeeded = tasks
            .iter()
            .any(|t| sinks.contains(&t.id) && t.status == TaskStatus::Succeeded);
        if sink_succeeded {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Succeeded => write!(f, "succeeded"),
            WorkflowStatus::Partial => write!(f, "partial"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    pub agent: String,
    pub operation: String,
    /// Index of the batch the task belongs to.
    pub batch: usize,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure detail, or the reason a task was skipped or cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Snapshot or final result of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: WorkflowStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub batch_count: usize,
    /// Per-task results in declaration order.
    pub tasks: Vec<TaskResult>,
}

impl ExecutionResult {
    /// Initial snapshot: every task pending.
    pub fn pending(workflow: &Workflow, plan: &ExecutionPlan) -> Self {
        let tasks = workflow
            .tasks()
            .iter()
            .map(|task| TaskResult {
                id: task.id.clone(),
                agent: task.agent.clone(),
                operation: task.operation.clone(),
                batch: plan.batch_of(&task.id).unwrap_or_default(),
                status: TaskStatus::Pending,
                output: None,
                error: None,
                started_at: None,
                finished_at: None,
            })
            .collect();
        Self {
            workflow_id: workflow.id(),
            name: workflow.name().map(str::to_string),
            status: WorkflowStatus::Pending,
            submitted_at: workflow.submitted_at(),
            started_at: None,
            finished_at: None,
            batch_count: plan.len(),
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.id.as_str() == id)
    }

    /// Number of tasks currently in `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a cancellation requested now can still stop anything.
    ///
    /// True while the run is unfinished and some task has not been reached.
    pub fn is_cancellable(&self) -> bool {
        !self.is_finished() && self.count(TaskStatus::Pending) > 0
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            workflow_id: self.workflow_id,
            name: self.name.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
        }
    }
}

/// One line of the workflow listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: WorkflowStatus,
    pub submitted_at: DateTime<Utc>,
}
