//! Task data model for workflow definitions.
//!
//! Tasks are the atomic units of work assigned to agents. A task names
//! its agent, the operation to invoke, keyed parameters and the ids of
//! the tasks it depends on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identifier of a task, unique within its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to (part of) another task's output.
///
/// Written as `{"ref": "taskId.field.path"}` in workflow definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRef {
    #[serde(rename = "ref")]
    pub path: String,
}

impl OutputRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Split into the referenced task id and the field path.
    ///
    /// Task ids never contain `.`, so the task id is everything before
    /// the first dot. Returns `None` when the leading segment is empty.
    pub fn split(&self) -> Option<(TaskId, Vec<String>)> {
        let mut segments = self.path.split('.');
        let task = segments.next().filter(|s| !s.is_empty())?;
        let fields = segments.map(str::to_string).collect();
        Some((TaskId::from(task), fields))
    }
}

/// A task parameter: a literal JSON value or a reference to an upstream output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Ref(OutputRef),
    Literal(Value),
}

impl ParamValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Self::Ref(OutputRef::new(path))
    }

    pub fn output_ref(&self) -> Option<&OutputRef> {
        match self {
            Self::Ref(r) => Some(r),
            Self::Literal(_) => None,
        }
    }
}

/// Task status in its lifecycle.
///
/// Tasks move `Pending -> Ready -> Running` and end in one of the
/// terminal states. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Dependencies not all satisfied yet.
    #[default]
    Pending,
    /// All dependencies succeeded; waiting for dispatch.
    Ready,
    /// Dispatch in flight.
    Running,
    Succeeded,
    Failed,
    /// A dependency did not succeed, so the task was never dispatched.
    Skipped,
    /// Cancellation stopped the workflow before the task's batch started.
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Pending, Cancelled)
                | (Ready, Running)
                | (Ready, Failed)
                | (Ready, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single task as declared in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// Name of the registered agent responsible for this task.
    pub agent: String,
    pub operation: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default, alias = "depends_on")]
    pub depends_on: Vec<TaskId>,
    /// Overrides the agent/default dispatch timeout.
    #[serde(default, alias = "timeout_secs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Task {
    pub fn new(id: &str, agent: &str, operation: &str) -> Self {
        Self {
            id: TaskId::from(id),
            agent: agent.to_string(),
            operation: operation.to_string(),
            params: BTreeMap::new(),
            depends_on: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: ParamValue) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.depends_on.push(TaskId::from(id));
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Iterate over `(param name, reference)` pairs.
    pub fn references(&self) -> impl Iterator<Item = (&str, &OutputRef)> {
        self.params
            .iter()
            .filter_map(|(k, v)| v.output_ref().map(|r| (k.as_str(), r)))
    }
}
