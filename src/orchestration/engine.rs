//! Execution engine for resolved workflows.
//!
//! The engine walks the plan batch by batch. Within a batch every ready
//! task gets its own spawned dispatch worker; workers report back over one
//! mpsc channel and the control loop, the only writer of task state,
//! applies the reports. A batch is joined completely before the next one
//! starts.

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::Params;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::core::workflow::Workflow;
use crate::error::{DispatchError, Error};
use crate::orchestration::dispatch::{resolve_params, DispatchClient};
use crate::orchestration::resolver::{Batch, ExecutionPlan};
use crate::workflow::types::{ExecutionResult, TaskResult, WorkflowStatus};
use crate::Result;

/// What a dispatch worker sends back to the control loop.
#[derive(Debug)]
struct TaskReport {
    task: TaskId,
    started_at: chrono::DateTime<Utc>,
    outcome: std::result::Result<Value, DispatchError>,
}

/// Task-state table for one run. Owned by the control loop.
struct RunState<'a> {
    workflow: &'a Workflow,
    result: ExecutionResult,
    positions: HashMap<TaskId, usize>,
    outputs: HashMap<TaskId, Value>,
}

impl<'a> RunState<'a> {
    fn new(workflow: &'a Workflow, plan: &ExecutionPlan) -> Self {
        let result = ExecutionResult::pending(workflow, plan);
        let positions = result
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self {
            workflow,
            result,
            positions,
            outputs: HashMap::new(),
        }
    }

    fn entry(&mut self, id: &TaskId) -> Option<&mut TaskResult> {
        let position = *self.positions.get(id)?;
        self.result.tasks.get_mut(position)
    }

    fn status(&self, id: &TaskId) -> TaskStatus {
        self.positions
            .get(id)
            .and_then(|&i| self.result.tasks.get(i))
            .map(|t| t.status)
            .unwrap_or_default()
    }

    /// Apply a lifecycle step. Illegal steps are logged and ignored.
    fn transition(&mut self, id: &TaskId, next: TaskStatus) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        if !entry.status.can_transition(next) {
            warn!(task = %id, from = %entry.status, to = %next, "ignoring illegal transition");
            return false;
        }
        entry.status = next;
        match next {
            TaskStatus::Running => entry.started_at = Some(Utc::now()),
            s if s.is_terminal() => entry.finished_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    fn finish(&mut self, id: &TaskId, next: TaskStatus, detail: Option<String>) {
        if self.transition(id, next) {
            if let Some(entry) = self.entry(id) {
                entry.error = detail;
            }
        }
    }

    /// First dependency of `task` that did not succeed.
    fn blocking_dependency<'t>(&self, task: &'t Task) -> Option<(&'t TaskId, TaskStatus)> {
        task.depends_on
            .iter()
            .map(|dep| (dep, self.status(dep)))
            .find(|(_, status)| *status != TaskStatus::Succeeded)
    }

    fn apply(&mut self, report: TaskReport) {
        let TaskReport {
            task,
            started_at,
            outcome,
        } = report;
        if let Some(entry) = self.entry(&task) {
            entry.started_at = Some(started_at);
        }
        match outcome {
            Ok(output) => {
                if self.transition(&task, TaskStatus::Succeeded) {
                    info!(task = %task, "task succeeded");
                    self.outputs.insert(task.clone(), output.clone());
                    if let Some(entry) = self.entry(&task) {
                        entry.output = Some(output);
                    }
                }
            }
            Err(e) => {
                warn!(task = %task, error = %e, "task failed");
                self.finish(&task, TaskStatus::Failed, Some(e.to_string()));
            }
        }
    }

    /// Mark every non-terminal task cancelled.
    fn cancel_remaining(&mut self, batch: usize) {
        let pending: Vec<TaskId> = self
            .result
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        for id in pending {
            self.finish(
                &id,
                TaskStatus::Cancelled,
                Some(format!("workflow cancelled before batch {} started", batch)),
            );
        }
    }
}

/// Stop at a batch boundary once cancellation has been requested.
fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Replace the published snapshot. Skipped once nobody is watching.
fn publish(snapshots: Option<&watch::Sender<ExecutionResult>>, state: &RunState<'_>) {
    if let Some(tx) = snapshots.filter(|tx| !tx.is_closed()) {
        tx.send_replace(state.result.clone());
    }
}

/// Wait for the next report, then take every report already queued behind it.
///
/// Returns `None` once all workers have dropped their senders.
async fn next_burst(rx: &mut mpsc::Receiver<TaskReport>) -> Option<Vec<TaskReport>> {
    let first = rx.recv().await?;
    let mut burst = vec![first];
    while let Ok(report) = rx.try_recv() {
        burst.push(report);
    }
    Some(burst)
}

/// Drives a resolved workflow to completion.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    dispatch: Arc<DispatchClient>,
    max_concurrent: usize,
}

impl ExecutionEngine {
    pub fn new(dispatch: Arc<DispatchClient>) -> Self {
        Self {
            dispatch,
            max_concurrent: 0,
        }
    }

    /// Bound the number of in-flight dispatches; 0 means unbounded.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Execute every batch of `plan` and return the final result.
    ///
    /// Cancellation is checked between batches only: in-flight dispatches
    /// always finish, and tasks of batches not yet started end `cancelled`.
    pub async fn run(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        self.execute(workflow, plan, cancel, None).await
    }

    /// Like [`run`](Self::run), publishing snapshots as tasks progress.
    pub async fn run_with_snapshots(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        cancel: CancellationToken,
        snapshots: &watch::Sender<ExecutionResult>,
    ) -> ExecutionResult {
        self.execute(workflow, plan, cancel, Some(snapshots)).await
    }

    #[instrument(
        skip_all,
        fields(workflow = %workflow.id().short(), tasks = workflow.len(), batches = plan.len())
    )]
    async fn execute(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        cancel: CancellationToken,
        snapshots: Option<&watch::Sender<ExecutionResult>>,
    ) -> ExecutionResult {
        let mut state = RunState::new(workflow, plan);
        state.result.status = WorkflowStatus::Running;
        state.result.started_at = Some(Utc::now());
        publish(snapshots, &state);
        info!("workflow started");

        let semaphore =
            (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));
        let mut cancel_observed = false;

        for batch in &plan.batches {
            if let Err(e) = checkpoint(&cancel) {
                info!(batch = batch.index, "{}", e);
                cancel_observed = true;
                state.cancel_remaining(batch.index);
                break;
            }
            self.run_batch(batch, &mut state, semaphore.clone(), snapshots)
                .await;
        }

        state.result.status = WorkflowStatus::aggregate(workflow, &state.result.tasks, cancel_observed);
        state.result.finished_at = Some(Utc::now());
        publish(snapshots, &state);
        info!(
            status = %state.result.status,
            succeeded = state.result.count(TaskStatus::Succeeded),
            failed = state.result.count(TaskStatus::Failed),
            skipped = state.result.count(TaskStatus::Skipped),
            cancelled = state.result.count(TaskStatus::Cancelled),
            "workflow finished"
        );
        state.result
    }

    async fn run_batch(
        &self,
        batch: &Batch,
        state: &mut RunState<'_>,
        semaphore: Option<Arc<Semaphore>>,
        snapshots: Option<&watch::Sender<ExecutionResult>>,
    ) {
        debug!(batch = batch.index, size = batch.len(), "starting batch");
        let workflow = state.workflow;
        let (tx, mut rx) = mpsc::channel::<TaskReport>(batch.len().max(1));
        let mut workers = Vec::with_capacity(batch.len());

        for id in &batch.tasks {
            let Some(task) = workflow.task(id) else {
                continue;
            };

            if let Some((dep, status)) = state.blocking_dependency(task) {
                let reason = format!("dependency '{}' {}", dep, status);
                debug!(task = %id, %reason, "skipping task");
                state.finish(id, TaskStatus::Skipped, Some(reason));
                continue;
            }

            state.transition(id, TaskStatus::Ready);
            let params = match resolve_params(task, &state.outputs) {
                Ok(params) => params,
                Err(e) => {
                    let e = e.into_dispatch_error(&task.agent);
                    warn!(task = %id, error = %e, "parameter resolution failed");
                    state.finish(id, TaskStatus::Failed, Some(e.to_string()));
                    continue;
                }
            };

            state.transition(id, TaskStatus::Running);
            let worker = DispatchWorker {
                dispatch: Arc::clone(&self.dispatch),
                task: id.clone(),
                agent: task.agent.clone(),
                operation: task.operation.clone(),
                params,
                timeout: self.dispatch.timeout_for(task),
                semaphore: semaphore.clone(),
                tx: tx.clone(),
            };
            workers.push((id.clone(), tokio::spawn(worker.run())));
        }
        drop(tx);
        publish(snapshots, state);

        while let Some(burst) = next_burst(&mut rx).await {
            for report in burst {
                state.apply(report);
            }
            publish(snapshots, state);
        }

        // Every sender is gone; reap workers and fail any that never reported.
        let ids: Vec<TaskId> = workers.iter().map(|(id, _)| id.clone()).collect();
        let joined = join_all(workers.into_iter().map(|(_, handle)| handle)).await;
        for (id, outcome) in ids.iter().zip(joined) {
            if let Err(e) = outcome {
                error!(task = %id, error = %e, "dispatch worker aborted");
            }
            if state.status(id) == TaskStatus::Running {
                state.finish(
                    id,
                    TaskStatus::Failed,
                    Some("dispatch worker exited without reporting a result".to_string()),
                );
            }
        }
        publish(snapshots, state);
    }
}

/// One in-flight dispatch.
struct DispatchWorker {
    dispatch: Arc<DispatchClient>,
    task: TaskId,
    agent: String,
    operation: String,
    params: Params,
    timeout: Duration,
    semaphore: Option<Arc<Semaphore>>,
    tx: mpsc::Sender<TaskReport>,
}

impl DispatchWorker {
    async fn run(self) {
        let _permit = match self.semaphore {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };
        let started_at = Utc::now();
        debug!(task = %self.task, agent = %self.agent, operation = %self.operation, "dispatching");
        let outcome = self
            .dispatch
            .dispatch(&self.agent, &self.operation, &self.params, self.timeout)
            .await;
        let report = TaskReport {
            task: self.task,
            started_at,
            outcome,
        };
        if let Err(e) = self.tx.send(report).await {
            warn!(task = %e.0.task, "control loop gone, dropping report");
        }
    }
}
