//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! This module provides the TaskDAG structure that represents task dependencies
//! as a directed graph, enabling parallel execution of independent tasks.
//! Edges point from a dependency to its dependent.

use crate::core::task::TaskId;
use crate::core::workflow::Workflow;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The task dependency graph.
///
/// TaskDAG uses petgraph's DiGraph to represent task dependencies.
/// Nodes are task ids in declaration order. Construction does not reject
/// cycles; that is the resolver's job.
pub struct TaskDAG {
    /// The underlying directed graph.
    graph: DiGraph<TaskId, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Build the graph for a validated workflow.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut dag = Self::new();
        for task in workflow.tasks() {
            dag.add_task(task.id.clone());
        }
        for task in workflow.tasks() {
            for dep in &task.depends_on {
                // Workflow validation guarantees both ends exist.
                dag.add_dependency(dep, &task.id);
            }
        }
        dag
    }

    /// Add a task to the DAG.
    ///
    /// If the task already exists, returns the existing NodeIndex.
    pub fn add_task(&mut self, id: TaskId) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&id) {
            return index;
        }

        let index = self.graph.add_node(id.clone());
        self.task_index.insert(id, index);
        index
    }

    /// Record that `from` must succeed before `to` can start.
    ///
    /// Returns `false` if either task is unknown or the edge already exists.
    pub fn add_dependency(&mut self, from: &TaskId, to: &TaskId) -> bool {
        match (self.task_index.get(from), self.task_index.get(to)) {
            (Some(&from_idx), Some(&to_idx)) => {
                if self.graph.find_edge(from_idx, to_idx).is_some() {
                    return false;
                }
                self.graph.add_edge(from_idx, to_idx, ());
                true
            }
            _ => false,
        }
    }

    /// Task id stored at a node.
    pub fn task_id(&self, index: NodeIndex) -> Option<&TaskId> {
        self.graph.node_weight(index)
    }

    /// Get the number of tasks in the DAG.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependencies (edges) in the DAG.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get the underlying graph for advanced operations.
    pub fn graph(&self) -> &DiGraph<TaskId, ()> {
        &self.graph
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
