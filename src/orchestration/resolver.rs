//! Dependency resolution into parallel batches.
//!
//! Batches are computed with Kahn-style topological layering: every task
//! whose remaining in-degree is zero forms the next batch. The order of
//! ids inside a batch is unspecified; callers must not rely on it.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::dag::TaskDAG;
use crate::core::task::TaskId;
use crate::core::workflow::Workflow;
use crate::error::CycleError;

/// A set of tasks with no dependencies among them, all of whose
/// dependencies belong to earlier batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub tasks: Vec<TaskId>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains(id)
    }
}

/// The ordered batches for one workflow submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Batch>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    /// Index of the batch containing `id`.
    pub fn batch_of(&self, id: &TaskId) -> Option<usize> {
        self.batches.iter().position(|b| b.contains(id))
    }
}

/// Compute the execution batches for a workflow.
pub fn resolve(workflow: &Workflow) -> Result<ExecutionPlan, CycleError> {
    let dag = TaskDAG::from_workflow(workflow);
    resolve_dag(&dag)
}

/// Layer an already built graph.
pub fn resolve_dag(dag: &TaskDAG) -> Result<ExecutionPlan, CycleError> {
    debug!(
        tasks = dag.task_count(),
        dependencies = dag.dependency_count(),
        "resolving batches"
    );
    let graph = dag.graph();
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut assigned = vec![false; graph.node_count()];

    let mut frontier: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();
    let mut batches = Vec::new();
    let mut remaining = graph.node_count();

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &node in &frontier {
            assigned[node.index()] = true;
            for succ in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    next.push(succ);
                }
            }
        }
        remaining -= frontier.len();
        let tasks: Vec<TaskId> = frontier
            .iter()
            .filter_map(|&n| graph.node_weight(n).cloned())
            .collect();
        debug!(batch = batches.len(), size = tasks.len(), "resolved batch");
        batches.push(Batch {
            index: batches.len(),
            tasks,
        });
        frontier = next;
    }

    if remaining > 0 {
        return Err(find_cycle(dag, &assigned));
    }

    Ok(ExecutionPlan { batches })
}

/// Walk backwards through unassigned predecessors until a node repeats.
///
/// Every unassigned node keeps at least one unassigned predecessor, so the
/// walk cannot dead-end and the first repeated node lies on a cycle.
fn find_cycle(dag: &TaskDAG, assigned: &[bool]) -> CycleError {
    let graph = dag.graph();
    let start = graph
        .node_indices()
        .find(|n| !assigned[n.index()])
        .unwrap_or_default();

    let mut path: Vec<NodeIndex> = Vec::new();
    let mut position = vec![None; graph.node_count()];
    let mut current = start;
    loop {
        if let Some(at) = position[current.index()] {
            let mut cycle: Vec<NodeIndex> = path[at..].to_vec();
            // The walk followed incoming edges; flip into dependency order.
            cycle.reverse();
            cycle.push(cycle[0]);
            let ids: Vec<TaskId> = cycle
                .iter()
                .filter_map(|&n| dag.task_id(n).cloned())
                .collect();
            return CycleError {
                task: ids[0].clone(),
                cycle: ids,
            };
        }
        position[current.index()] = Some(path.len());
        path.push(current);
        match graph
            .neighbors_directed(current, Direction::Incoming)
            .find(|p| !assigned[p.index()])
        {
            Some(pred) => current = pred,
            None => break,
        }
    }

    // Unreachable for a graph where Kahn stalled; report the start node.
    let task = dag.task_id(start).cloned().unwrap_or_else(|| TaskId::from(""));
    CycleError {
        cycle: vec![task.clone()],
        task,
    }
}
