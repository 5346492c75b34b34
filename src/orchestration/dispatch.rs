//! Worker dispatch client.
//!
//! One dispatch is one bounded round trip to a registered agent. Parameter
//! references are resolved against recorded upstream outputs before the
//! call is made.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::agent::{AgentRegistry, Params};
use crate::core::task::{OutputRef, ParamValue, Task, TaskId};
use crate::error::DispatchError;

/// Failure to build a task's parameters from upstream outputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("Parameter '{param}' references '{referenced}', which has no recorded output")]
    NotCompleted { param: String, referenced: TaskId },

    #[error("Parameter '{param}': output of '{referenced}' has no field '{path}'")]
    MissingField {
        param: String,
        referenced: TaskId,
        path: String,
    },
}

impl ParamError {
    /// Report the error as a rejected dispatch against `agent`.
    pub fn into_dispatch_error(self, agent: &str) -> DispatchError {
        DispatchError::AgentRejected {
            agent: agent.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Sends task requests to the agents that own them.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    registry: Arc<AgentRegistry>,
    default_timeout: Duration,
}

impl DispatchClient {
    pub fn new(registry: Arc<AgentRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    /// Effective timeout: task override, then agent override, then default.
    pub fn timeout_for(&self, task: &Task) -> Duration {
        task.timeout_secs
            .map(Duration::from_secs)
            .or_else(|| self.registry.timeout_for(&task.agent))
            .unwrap_or(self.default_timeout)
    }

    /// Invoke `operation` on `agent` and wait at most `timeout` for the reply.
    #[instrument(skip(self, params), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn dispatch(
        &self,
        agent: &str,
        operation: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<Value, DispatchError> {
        let Some(worker) = self.registry.get(agent) else {
            return Err(DispatchError::AgentUnreachable {
                agent: agent.to_string(),
                reason: "agent is not registered".to_string(),
            });
        };

        match tokio::time::timeout(timeout, worker.invoke(operation, params)).await {
            Ok(result) => {
                debug!(ok = result.is_ok(), "dispatch returned");
                result
            }
            Err(_) => Err(DispatchError::AgentTimeout {
                agent: agent.to_string(),
                timeout,
            }),
        }
    }
}

/// Build the concrete parameter map for `task`.
///
/// Literals pass through. A reference selects a dot-separated field path
/// from the referenced task's output; numeric segments index arrays. A
/// reference without a field path selects the whole output.
pub fn resolve_params(task: &Task, outputs: &HashMap<TaskId, Value>) -> Result<Params, ParamError> {
    let mut params = Params::new();
    for (name, value) in &task.params {
        let resolved = match value {
            ParamValue::Literal(v) => v.clone(),
            ParamValue::Ref(reference) => resolve_reference(name, reference, outputs)?,
        };
        params.insert(name.clone(), resolved);
    }
    Ok(params)
}

fn resolve_reference(
    param: &str,
    reference: &OutputRef,
    outputs: &HashMap<TaskId, Value>,
) -> Result<Value, ParamError> {
    let (referenced, fields) = reference.split().ok_or_else(|| ParamError::NotCompleted {
        param: param.to_string(),
        referenced: TaskId::from(reference.path.as_str()),
    })?;
    let output = outputs
        .get(&referenced)
        .ok_or_else(|| ParamError::NotCompleted {
            param: param.to_string(),
            referenced: referenced.clone(),
        })?;

    let mut current = output;
    for field in &fields {
        let next = match current {
            Value::Object(map) => map.get(field.as_str()),
            Value::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| ParamError::MissingField {
            param: param.to_string(),
            referenced: referenced.clone(),
            path: fields.join("."),
        })?;
    }
    Ok(current.clone())
}
