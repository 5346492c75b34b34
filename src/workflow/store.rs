//! In-memory registry of submitted workflow runs.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::workflow::WorkflowId;
use crate::workflow::types::{ExecutionResult, WorkflowSummary};
use crate::{Error, Result};

/// Live view of one run: its latest snapshot and its cancel switch.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub snapshot: watch::Receiver<ExecutionResult>,
    pub cancel: CancellationToken,
}

impl RunHandle {
    pub fn new(snapshot: watch::Receiver<ExecutionResult>, cancel: CancellationToken) -> Self {
        Self { snapshot, cancel }
    }

    pub fn current(&self) -> ExecutionResult {
        self.snapshot.borrow().clone()
    }

    /// Wait until the run reaches a terminal status.
    ///
    /// If the engine goes away first, the last published snapshot is returned.
    pub async fn finished(&self) -> ExecutionResult {
        let mut rx = self.snapshot.clone();
        if rx.wait_for(|r| r.is_finished()).await.is_err() {
            warn!("run ended without a final snapshot");
        }
        let result = rx.borrow().clone();
        result
    }
}

#[derive(Debug, Default)]
pub struct WorkflowStore {
    runs: RwLock<HashMap<WorkflowId, RunHandle>>,
    /// Finished runs to keep; 0 keeps everything.
    retain_finished: usize,
}

impl WorkflowStore {
    /// Store that never evicts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `retain_finished` finished runs.
    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            runs: RwLock::default(),
            retain_finished,
        }
    }

    /// Track a new run, evicting the oldest finished runs beyond the limit.
    ///
    /// Runs still in flight are never evicted.
    pub async fn insert(&self, id: WorkflowId, handle: RunHandle) {
        let mut runs = self.runs.write().await;
        runs.insert(id, handle);
        if self.retain_finished == 0 {
            return;
        }

        let mut finished: Vec<(WorkflowId, DateTime<Utc>)> = runs
            .iter()
            .filter_map(|(id, handle)| {
                let snapshot = handle.snapshot.borrow();
                if !snapshot.is_finished() {
                    return None;
                }
                let at = snapshot.finished_at.unwrap_or(snapshot.submitted_at);
                Some((*id, at))
            })
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }

        finished.sort_by_key(|(_, at)| *at);
        let excess = finished.len() - self.retain_finished;
        for (evicted, _) in finished.into_iter().take(excess) {
            runs.remove(&evicted);
            debug!(workflow = %evicted.short(), "evicted finished run");
        }
    }

    pub async fn get(&self, id: &WorkflowId) -> Option<RunHandle> {
        self.runs.read().await.get(id).cloned()
    }

    pub async fn snapshot(&self, id: &WorkflowId) -> Result<ExecutionResult> {
        self.get(id)
            .await
            .map(|handle| handle.current())
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))
    }

    /// Summaries of every run, oldest first.
    pub async fn list(&self) -> Vec<WorkflowSummary> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<WorkflowSummary> = runs
            .values()
            .map(|handle| handle.snapshot.borrow().summary())
            .collect();
        summaries.sort_by_key(|s| s.submitted_at);
        summaries
    }

    /// Request cooperative cancellation of a run.
    ///
    /// Returns the snapshot current at the time of the request. Cancelling
    /// a finished run is a no-op.
    pub async fn cancel(&self, id: &WorkflowId) -> Result<ExecutionResult> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?;
        let current = handle.current();
        info!(
            workflow = %id.short(),
            status = %current.status,
            cancellable = current.is_cancellable(),
            "cancellation requested"
        );
        handle.cancel.cancel();
        Ok(current)
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}
