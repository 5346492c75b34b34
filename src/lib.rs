pub mod agent;
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod orchestrator;
pub mod workflow;

pub use agent::{Agent, AgentHealth, AgentRegistry, AgentStatus, Params};
pub use config::Config;
pub use error::{CycleError, DispatchError, Error, Result, ValidationError};
pub use orchestrator::{Orchestrator, Submission};
pub use workflow::{ExecutionResult, TaskResult, WorkflowStatus};
