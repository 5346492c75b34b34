//! Remote worker agent reached over HTTP.
//!
//! Protocol: `POST {endpoint}/invoke` with `{operation, params}` and a reply
//! of `{status: "ok"|"error", output?, error?}`; `GET {endpoint}/health`
//! answers 2xx when the worker is up.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::agent::{Agent, AgentHealth, Params};
use crate::error::DispatchError;
use crate::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    operation: &'a str,
    params: &'a Params,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Deserialize)]
struct InvokeReply {
    status: ReplyStatus,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Worker agent behind an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    name: String,
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl HttpAgent {
    /// Build a client for `endpoint`; `timeout` bounds each request.
    pub fn new(name: &str, endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;

        debug!(agent = name, endpoint, "created http agent");

        Ok(Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::AgentTimeout {
                agent: self.name.clone(),
                timeout: self.timeout,
            }
        } else if e.is_connect() {
            DispatchError::AgentUnreachable {
                agent: self.name.clone(),
                reason: e.to_string(),
            }
        } else {
            DispatchError::AgentRejected {
                agent: self.name.clone(),
                reason: e.to_string(),
            }
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> DispatchError {
        DispatchError::AgentRejected {
            agent: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    #[instrument(skip(self, params), fields(agent = %self.name))]
    async fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, DispatchError> {
        let url = self.url("invoke");
        debug!(url = %url, "invoking agent");

        let response = self
            .client
            .post(&url)
            .json(&InvokeRequest { operation, params })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "agent returned error status");
            return Err(self.rejected(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body)
            }));
        }

        let reply: InvokeReply = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_send_error(e)
            } else {
                self.rejected(format!("invalid reply: {}", e))
            }
        })?;

        match reply.status {
            ReplyStatus::Ok => Ok(reply.output),
            ReplyStatus::Error => Err(self.rejected(
                reply
                    .error
                    .unwrap_or_else(|| "agent reported an error".to_string()),
            )),
        }
    }

    #[instrument(skip(self), fields(agent = %self.name))]
    async fn health(&self) -> AgentHealth {
        let result = self
            .client
            .get(self.url("health"))
            .timeout(HEALTH_TIMEOUT.min(self.timeout))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => AgentHealth::Healthy,
            Ok(response) => AgentHealth::Unhealthy {
                reason: format!("HTTP {}", response.status()),
            },
            Err(e) => AgentHealth::Unhealthy {
                reason: e.to_string(),
            },
        }
    }

    fn endpoint(&self) -> Option<&str> {
        Some(&self.endpoint)
    }
}
