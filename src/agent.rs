//! Worker agents and the registry that names them.
//!
//! An agent is anything that can perform named operations. The engine
//! only sees the `Agent` trait; new kinds of workers are added by
//! registering another implementation under a name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::config::Config;
use crate::core::workflow::AgentLookup;
use crate::error::DispatchError;
use crate::orchestration::http_agent::HttpAgent;
use crate::orchestration::retry::{RetryPolicy, RetryingAgent};
use crate::Result;

/// Resolved parameters passed to an agent invocation.
pub type Params = Map<String, Value>;

/// Health as reported by an agent health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AgentHealth {
    Healthy,
    Unhealthy { reason: String },
    /// The agent has no way to report health.
    Unknown,
}

impl AgentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Capability interface for a worker agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Perform `operation` and return its output payload.
    async fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, DispatchError>;

    async fn health(&self) -> AgentHealth {
        AgentHealth::Unknown
    }

    /// Human-readable location of the agent, if it has one.
    fn endpoint(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl<A: Agent + ?Sized> Agent for Arc<A> {
    async fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, DispatchError> {
        (**self).invoke(operation, params).await
    }

    async fn health(&self) -> AgentHealth {
        (**self).health().await
    }

    fn endpoint(&self) -> Option<&str> {
        (**self).endpoint()
    }
}

#[derive(Clone)]
struct Registration {
    agent: Arc<dyn Agent>,
    timeout: Option<Duration>,
}

/// Status line for one registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub name: String,
    pub endpoint: Option<String>,
    pub healthy: bool,
    pub health: AgentHealth,
}

/// Mapping from agent name to implementation.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Registration>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP agents for every `[[agents]]` entry in the config.
    ///
    /// Agents are wrapped in a `RetryingAgent` when `retry.max_attempts > 1`;
    /// each attempt then gets an equal share of the agent's timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = RetryPolicy::from(&config.retry);
        let mut registry = Self::new();
        for entry in &config.agents {
            let timeout = entry.timeout_secs.map(Duration::from_secs);
            let total = timeout.unwrap_or_else(|| config.dispatch.timeout());
            let http = HttpAgent::new(&entry.name, &entry.endpoint, total)?;
            if policy.max_attempts > 1 {
                let retrying = RetryingAgent::new(&entry.name, http, policy.clone())
                    .with_attempt_timeout(policy.attempt_timeout(total));
                registry.register_with_timeout(&entry.name, Arc::new(retrying), timeout);
            } else {
                registry.register_with_timeout(&entry.name, Arc::new(http), timeout);
            }
        }
        Ok(registry)
    }

    /// Register (or replace) an agent under `name`.
    pub fn register(&mut self, name: &str, agent: Arc<dyn Agent>) {
        self.register_with_timeout(name, agent, None);
    }

    /// Register with a per-agent dispatch timeout override.
    pub fn register_with_timeout(
        &mut self,
        name: &str,
        agent: Arc<dyn Agent>,
        timeout: Option<Duration>,
    ) {
        self.agents
            .insert(name.to_string(), Registration { agent, timeout });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).map(|r| Arc::clone(&r.agent))
    }

    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        self.agents.get(name).and_then(|r| r.timeout)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Check every agent concurrently.
    pub async fn statuses(&self) -> Vec<AgentStatus> {
        let checks = self.agents.iter().map(|(name, reg)| async move {
            let health = reg.agent.health().await;
            AgentStatus {
                name: name.clone(),
                endpoint: reg.agent.endpoint().map(str::to_string),
                healthy: health.is_healthy(),
                health,
            }
        });
        join_all(checks).await
    }
}

impl AgentLookup for AgentRegistry {
    fn contains_agent(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
