//! Workflow definitions and validation.
//!
//! `Workflow::parse` turns a raw JSON submission into a validated,
//! immutable workflow. Validation is pure: the only outside input is the
//! agent lookup used to reject tasks aimed at unregistered agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::core::task::{Task, TaskId};
use crate::error::ValidationError;

/// Unique identifier for a submitted workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Answers whether an agent name is registered.
///
/// Implemented by the agent registry; the descriptor store only needs
/// this much of it.
pub trait AgentLookup {
    fn contains_agent(&self, name: &str) -> bool;
}

impl AgentLookup for HashSet<String> {
    fn contains_agent(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl AgentLookup for [&str] {
    fn contains_agent(&self, name: &str) -> bool {
        self.iter().any(|agent| *agent == name)
    }
}

/// The submission format, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl WorkflowDefinition {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { name: None, tasks }
    }

    pub fn named(name: &str, tasks: Vec<Task>) -> Self {
        Self {
            name: Some(name.to_string()),
            tasks,
        }
    }
}

/// A validated workflow.
///
/// Tasks keep their declaration order. Every dependency and reference
/// points at a task declared in the same workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: WorkflowId,
    name: Option<String>,
    submitted_at: DateTime<Utc>,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl Workflow {
    /// Parse and validate a raw JSON workflow definition.
    pub fn parse(raw: &str, agents: &(impl AgentLookup + ?Sized)) -> Result<Self, ValidationError> {
        let definition: WorkflowDefinition = serde_json::from_str(raw)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_definition(definition, agents)
    }

    /// Validate an already deserialized definition.
    pub fn from_definition(
        definition: WorkflowDefinition,
        agents: &(impl AgentLookup + ?Sized),
    ) -> Result<Self, ValidationError> {
        if definition.tasks.is_empty() {
            return Err(ValidationError::EmptyWorkflow);
        }

        let mut index = HashMap::with_capacity(definition.tasks.len());
        for (position, task) in definition.tasks.iter().enumerate() {
            if task.id.is_empty() {
                return Err(ValidationError::EmptyTaskId { position });
            }
            if task.id.as_str().contains('.') {
                return Err(ValidationError::InvalidTaskId {
                    id: task.id.clone(),
                    reason: "'.' is reserved for output field paths".to_string(),
                });
            }
            if index.insert(task.id.clone(), position).is_some() {
                return Err(ValidationError::DuplicateTaskId(task.id.clone()));
            }
            if task.operation.trim().is_empty() {
                return Err(ValidationError::EmptyOperation {
                    task: task.id.clone(),
                });
            }
            if !agents.contains_agent(&task.agent) {
                return Err(ValidationError::UnknownAgent {
                    task: task.id.clone(),
                    agent: task.agent.clone(),
                });
            }
        }

        for task in &definition.tasks {
            for dep in &task.depends_on {
                if dep == &task.id {
                    return Err(ValidationError::SelfDependency(task.id.clone()));
                }
                if !index.contains_key(dep) {
                    return Err(ValidationError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let workflow = Self {
            id: WorkflowId::new(),
            name: definition.name,
            submitted_at: Utc::now(),
            tasks: definition.tasks,
            index,
        };
        workflow.validate_references()?;
        Ok(workflow)
    }

    /// Every reference must name a declared ancestor of the referencing task,
    /// so its output is guaranteed to exist by the time the task runs.
    fn validate_references(&self) -> Result<(), ValidationError> {
        for task in &self.tasks {
            let mut ancestors: Option<HashSet<&TaskId>> = None;
            for (param, reference) in task.references() {
                let referenced = match reference.split() {
                    Some((id, _)) if self.index.contains_key(&id) => id,
                    _ => {
                        return Err(ValidationError::UnknownReference {
                            task: task.id.clone(),
                            param: param.to_string(),
                            reference: reference.path.clone(),
                        })
                    }
                };
                let ancestors = ancestors.get_or_insert_with(|| self.ancestors(&task.id));
                if !ancestors.contains(&referenced) {
                    return Err(ValidationError::ReferenceNotDependency {
                        task: task.id.clone(),
                        param: param.to_string(),
                        referenced,
                    });
                }
            }
        }
        Ok(())
    }

    /// All direct and transitive dependencies of `id`.
    ///
    /// Terminates on cyclic input; cycles are reported later by the resolver.
    pub fn ancestors(&self, id: &TaskId) -> HashSet<&TaskId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&TaskId> = self
            .task(id)
            .map(|t| t.depends_on.iter().collect())
            .unwrap_or_default();
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep) {
                continue;
            }
            if let Some(task) = self.task(dep) {
                stack.extend(task.depends_on.iter());
            }
        }
        seen
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks no other task depends on.
    pub fn sinks(&self) -> Vec<&TaskId> {
        let depended_on: HashSet<&TaskId> =
            self.tasks.iter().flat_map(|t| t.depends_on.iter()).collect();
        self.tasks
            .iter()
            .map(|t| &t.id)
            .filter(|id| !depended_on.contains(id))
            .collect()
    }
}
