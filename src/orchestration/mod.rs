//! Orchestration layer: batch resolution, worker dispatch and execution.
//!
//! The resolver turns a validated workflow into ordered batches, the
//! dispatch client talks to agents, and the engine drives batches through
//! the dispatch client while tracking per-task state.

pub mod dispatch;
pub mod engine;
pub mod http_agent;
pub mod resolver;
pub mod retry;

pub use dispatch::{resolve_params, DispatchClient, ParamError};
pub use engine::ExecutionEngine;
pub use http_agent::HttpAgent;
pub use resolver::{resolve, Batch, ExecutionPlan};
pub use retry::{RetryPolicy, RetryingAgent};
