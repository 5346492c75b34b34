//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted in-process agents that record every call
//! - Workflow and orchestrator builders
//! - A local HTTP worker speaking the agent protocol

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::Instant;

use maestro::agent::{Agent, AgentHealth, AgentRegistry, Params};
use maestro::config::Config;
use maestro::core::task::Task;
use maestro::core::workflow::{Workflow, WorkflowDefinition};
use maestro::orchestration::{resolve, DispatchClient, ExecutionEngine, ExecutionPlan};
use maestro::{DispatchError, Orchestrator};

/// Default time a scripted call takes.
pub const CALL_TIME: Duration = Duration::from_millis(100);

/// How a scripted agent answers one operation.
#[derive(Clone)]
pub enum Script {
    /// Return `{"operation", "params"}`.
    Echo,
    Respond(Value),
    Fail(DispatchError),
    /// Fail this many times with `AgentUnreachable`, then echo.
    FlakyThenEcho(usize),
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: String,
    pub params: Params,
    pub started: Instant,
    pub finished: Instant,
}

/// In-process agent whose behaviour is scripted per operation.
pub struct ScriptedAgent {
    name: String,
    scripts: Mutex<HashMap<String, Script>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<Call>>,
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    health: AgentHealth,
}

impl ScriptedAgent {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, AgentHealth::Healthy))
    }

    pub fn unhealthy(name: &str) -> Arc<Self> {
        Arc::new(Self::build(
            name,
            AgentHealth::Unhealthy {
                reason: "scripted".to_string(),
            },
        ))
    }

    fn build(name: &str, health: AgentHealth) -> Self {
        Self {
            name: name.to_string(),
            scripts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            health,
        }
    }

    pub fn script(&self, operation: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(operation.to_string(), script);
    }

    pub fn fail(&self, operation: &str, reason: &str) {
        self.script(
            operation,
            Script::Fail(DispatchError::AgentRejected {
                agent: self.name.clone(),
                reason: reason.to_string(),
            }),
        );
    }

    pub fn delay(&self, operation: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(operation.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The recorded call for `operation`. Panics if it never ran.
    pub fn call(&self, operation: &str) -> Call {
        self.calls()
            .into_iter()
            .find(|c| c.operation == operation)
            .unwrap_or_else(|| panic!("operation '{}' was never invoked", operation))
    }

    pub fn invoked(&self, operation: &str) -> bool {
        self.calls().iter().any(|c| c.operation == operation)
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, operation: &str, params: &Params) -> Result<Value, DispatchError> {
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(CALL_TIME);
        tokio::time::sleep(delay).await;

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(operation)
            .cloned()
            .unwrap_or(Script::Echo);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(operation.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            operation: operation.to_string(),
            params: params.clone(),
            started,
            finished: Instant::now(),
        });

        let echo = json!({ "operation": operation, "params": params });
        match script {
            Script::Echo => Ok(echo),
            Script::Respond(value) => Ok(value),
            Script::Fail(err) => Err(err),
            Script::FlakyThenEcho(failures) if attempt <= failures => {
                Err(DispatchError::AgentUnreachable {
                    agent: self.name.clone(),
                    reason: format!("scripted outage #{}", attempt),
                })
            }
            Script::FlakyThenEcho(_) => Ok(echo),
        }
    }

    async fn health(&self) -> AgentHealth {
        self.health.clone()
    }
}

/// Registry with each scripted agent under its name.
pub fn registry(agents: &[(&str, Arc<ScriptedAgent>)]) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for (name, agent) in agents {
        registry.register(name, Arc::clone(agent) as Arc<dyn Agent>);
    }
    registry
}

pub fn orchestrator(agents: &[(&str, Arc<ScriptedAgent>)]) -> Orchestrator {
    Orchestrator::new(registry(agents), &Config::default())
}

pub fn engine(agents: &[(&str, Arc<ScriptedAgent>)], default_timeout: Duration) -> ExecutionEngine {
    let dispatch = DispatchClient::new(Arc::new(registry(agents)), default_timeout);
    ExecutionEngine::new(Arc::new(dispatch))
}

pub fn task(id: &str, agent: &str, operation: &str) -> Task {
    Task::new(id, agent, operation)
}

/// Validate and resolve; panics on structural errors.
pub fn plan(tasks: Vec<Task>, agents: &[&str]) -> (Workflow, ExecutionPlan) {
    let workflow = Workflow::from_definition(WorkflowDefinition::new(tasks), agents).unwrap();
    let plan = resolve(&workflow).unwrap();
    (workflow, plan)
}

/// Serve `router` on an ephemeral localhost port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A localhost address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
