//! Retry decorator for agents.
//!
//! Only transient dispatch errors are retried. The dispatch client's
//! timeout wraps the whole retried call, so backoff never extends a
//! dispatch past its bound. Each attempt gets its own smaller budget so a
//! stalled first attempt leaves room for the next one.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentHealth, Params};
use crate::config::RetryConfig;
use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Share of `total` one attempt may use.
    pub fn attempt_timeout(&self, total: Duration) -> Duration {
        total / self.max_attempts
    }
}

/// Wraps an agent and retries unreachable/timeout failures.
pub struct RetryingAgent<A> {
    name: String,
    inner: A,
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl<A: Agent> RetryingAgent<A> {
    pub fn new(name: &str, inner: A, policy: RetryPolicy) -> Self {
        Self {
            name: name.to_string(),
            inner,
            policy,
            attempt_timeout: None,
        }
    }

    /// Bound every attempt; an attempt that overruns counts as `AgentTimeout`.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    async fn attempt(&self, operation: &str, params: &Params) -> Result<Value, DispatchError> {
        let Some(timeout) = self.attempt_timeout else {
            return self.inner.invoke(operation, params).await;
        };
        tokio::time::timeout(timeout, self.inner.invoke(operation, params))
            .await
            .unwrap_or_else(|_| Err(DispatchError::AgentTimeout {
                agent: self.name.clone(),
                timeout,
            }))
    }
}

#[async_trait]
impl<A: Agent> Agent for RetryingAgent<A> {
    async fn invoke(&self, operation: &str, params: &Params) -> Result<Value, DispatchError> {
        let mut attempt = 1;
        loop {
            match self.attempt(operation, params).await {
                Ok(output) => {
                    if attempt > 1 {
                        debug!(agent = %self.name, attempt, "succeeded after retry");
                    }
                    return Ok(output);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        agent = %self.name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient dispatch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health(&self) -> AgentHealth {
        self.inner.health().await
    }

    fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint()
    }
}
