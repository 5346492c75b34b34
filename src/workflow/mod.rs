//! Workflow run tracking.
//!
//! Result types for finished and in-progress runs, and the store that keeps
//! every submitted run reachable by id.

pub mod store;
pub mod types;

pub use store::{RunHandle, WorkflowStore};
pub use types::{ExecutionResult, TaskResult, WorkflowStatus, WorkflowSummary};
