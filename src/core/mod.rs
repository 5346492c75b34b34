//! Core domain models for workflow orchestration.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: tasks, validated workflows and the dependency graph.

pub mod dag;
pub mod task;
pub mod workflow;

pub use dag::TaskDAG;
pub use task::{OutputRef, ParamValue, Task, TaskId, TaskStatus};
pub use workflow::{AgentLookup, Workflow, WorkflowDefinition, WorkflowId};
