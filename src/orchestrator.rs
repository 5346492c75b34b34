//! Top-level facade tying the pieces together.
//!
//! An `Orchestrator` owns the agent registry, the execution engine and the
//! run store. It is constructed explicitly and shared by the HTTP API and
//! the CLI; there is no global state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::agent::{AgentRegistry, AgentStatus};
use crate::config::Config;
use crate::core::workflow::{Workflow, WorkflowId};
use crate::orchestration::dispatch::DispatchClient;
use crate::orchestration::engine::ExecutionEngine;
use crate::orchestration::resolver::{resolve, Batch, ExecutionPlan};
use crate::workflow::store::{RunHandle, WorkflowStore};
use crate::workflow::types::{ExecutionResult, WorkflowSummary};
use crate::{Error, Result};

pub const ACCEPTED: &str = "accepted";

/// Receipt for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub workflow_id: WorkflowId,
    pub status: String,
    pub batches: Vec<Batch>,
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    engine: ExecutionEngine,
    store: WorkflowStore,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry, config: &Config) -> Self {
        let registry = Arc::new(registry);
        let dispatch = DispatchClient::new(Arc::clone(&registry), config.dispatch.timeout());
        let engine = ExecutionEngine::new(Arc::new(dispatch))
            .with_max_concurrent(config.dispatch.max_concurrent);
        Self {
            registry,
            engine,
            store: WorkflowStore::with_retention(config.server.retain_finished_runs),
        }
    }

    /// Build HTTP agents from `[[agents]]` and wire everything up.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = AgentRegistry::from_config(config)?;
        info!(agents = registry.len(), "agent registry ready");
        Ok(Self::new(registry, config))
    }

    /// Validate and resolve without running anything.
    pub fn plan(&self, raw: &str) -> Result<(Workflow, ExecutionPlan)> {
        let workflow = Workflow::parse(raw, self.registry.as_ref())?;
        let plan = resolve(&workflow)?;
        Ok((workflow, plan))
    }

    /// Validate, resolve and start a workflow from raw JSON.
    pub async fn submit(&self, raw: &str) -> Result<Submission> {
        let (workflow, plan) = self.plan(raw)?;
        self.start(workflow, plan).await
    }

    #[instrument(skip_all, fields(workflow = %workflow.id().short()))]
    async fn start(&self, workflow: Workflow, plan: ExecutionPlan) -> Result<Submission> {
        let id = workflow.id();
        let (tx, rx) = watch::channel(ExecutionResult::pending(&workflow, &plan));
        let cancel = CancellationToken::new();
        self.store.insert(id, RunHandle::new(rx, cancel.clone())).await;

        let submission = Submission {
            workflow_id: id,
            status: ACCEPTED.to_string(),
            batches: plan.batches.clone(),
        };
        info!(tasks = workflow.len(), batches = plan.len(), "workflow accepted");

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine
                .run_with_snapshots(&workflow, &plan, cancel, &tx)
                .await;
        });
        Ok(submission)
    }

    pub async fn status(&self, id: &WorkflowId) -> Result<ExecutionResult> {
        self.store.snapshot(id).await
    }

    pub async fn list(&self) -> Vec<WorkflowSummary> {
        self.store.list().await
    }

    /// Request cancellation; returns the run as it stood when asked.
    pub async fn cancel(&self, id: &WorkflowId) -> Result<ExecutionResult> {
        self.store.cancel(id).await
    }

    /// Wait for a run to finish and return its final result.
    pub async fn wait(&self, id: &WorkflowId) -> Result<ExecutionResult> {
        let handle = self
            .store
            .get(id)
            .await
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?;
        Ok(handle.finished().await)
    }

    /// Submit and block until the aggregate status is final.
    pub async fn run_to_completion(&self, raw: &str) -> Result<ExecutionResult> {
        let submission = self.submit(raw).await?;
        self.wait(&submission.workflow_id).await
    }

    /// Registered agents with freshly checked health.
    pub async fn list_agents(&self) -> Vec<AgentStatus> {
        self.registry.statuses().await
    }
}
