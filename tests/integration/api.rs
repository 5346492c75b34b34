//! Control API tests through the axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use maestro::api::{create_router, AppState};
use maestro::core::workflow::WorkflowId;
use maestro::{Orchestrator, WorkflowStatus};

use crate::fixtures::{orchestrator, ScriptedAgent};

struct Api {
    router: Router,
    orchestrator: Arc<Orchestrator>,
}

impl Api {
    fn new() -> Self {
        let worker = ScriptedAgent::new("w");
        worker.fail("explode", "kaboom");
        worker.delay("slow", Duration::from_secs(1));
        let state = AppState::new(orchestrator(&[
            ("w", worker),
            ("sick", ScriptedAgent::unhealthy("sick")),
        ]));
        Self {
            orchestrator: Arc::clone(&state.orchestrator),
            router: create_router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn submit(&self, body: Value) -> WorkflowId {
        let (status, json) = self.post("/workflows", &body.to_string()).await;
        assert_eq!(status, StatusCode::ACCEPTED, "{json}");
        serde_json::from_value(json["workflow_id"].clone()).unwrap()
    }
}

fn diamond() -> Value {
    json!({
        "name": "diamond",
        "tasks": [
            {"id": "a", "agent": "w", "operation": "op"},
            {"id": "b", "agent": "w", "operation": "op", "dependsOn": ["a"]},
            {"id": "c", "agent": "w", "operation": "op", "dependsOn": ["a"]},
            {"id": "d", "agent": "w", "operation": "op", "dependsOn": ["b", "c"]}
        ]
    })
}

// ========== Submission ==========

#[tokio::test]
async fn test_submit_returns_accepted_with_batches() {
    let api = Api::new();
    let (status, body) = api.post("/workflows", &diamond().to_string()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["workflow_id"].is_string());
    let batches = body["batches"].as_array().unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0]["tasks"], json!(["a"]));
    assert_eq!(batches[2]["tasks"], json!(["d"]));
}

#[tokio::test]
async fn test_submit_unknown_dependency_is_bad_request() {
    let api = Api::new();
    let (status, body) = api
        .post(
            "/workflows",
            r#"{"tasks":[{"id":"a","agent":"w","operation":"op","dependsOn":["X"]}]}"#,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["message"].as_str().unwrap().contains("'X'"));
    assert_eq!(body["task_ids"], json!(["a", "X"]));
}

#[tokio::test]
async fn test_submit_cycle_is_bad_request() {
    let api = Api::new();
    let (status, body) = api
        .post(
            "/workflows",
            r#"{"tasks":[
                {"id":"a","agent":"w","operation":"op","dependsOn":["b"]},
                {"id":"b","agent":"w","operation":"op","dependsOn":["a"]}
            ]}"#,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cycle");
    let ids: Vec<&str> = body["task_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(ids[0] == "a" || ids[0] == "b");
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_submit_malformed_json() {
    let api = Api::new();
    let (status, body) = api.post("/workflows", "{ not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["task_ids"], json!([]));
}

#[tokio::test]
async fn test_submit_unknown_agent() {
    let api = Api::new();
    let (status, body) = api
        .post(
            "/workflows",
            r#"{"tasks":[{"id":"a","agent":"painter","operation":"op"}]}"#,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("painter"));
}

// ========== Status ==========

#[tokio::test]
async fn test_get_workflow_reports_final_result() {
    let api = Api::new();
    let id = api.submit(diamond()).await;
    api.orchestrator.wait(&id).await.unwrap();

    let (status, body) = api.get(&format!("/workflows/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["name"], "diamond");
    assert_eq!(body["batch_count"], 3);
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t["status"] == "succeeded"));
    assert_eq!(tasks[3]["output"]["operation"], "op");
}

#[tokio::test]
async fn test_get_workflow_reports_task_failure() {
    let api = Api::new();
    let id = api
        .submit(json!({"tasks": [
            {"id": "a", "agent": "w", "operation": "explode"},
            {"id": "b", "agent": "w", "operation": "op", "dependsOn": ["a"]}
        ]}))
        .await;
    api.orchestrator.wait(&id).await.unwrap();

    let (_, body) = api.get(&format!("/workflows/{}", id)).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["tasks"][0]["status"], "failed");
    assert!(body["tasks"][0]["error"].as_str().unwrap().contains("kaboom"));
    assert_eq!(body["tasks"][1]["status"], "skipped");
}

#[tokio::test]
async fn test_get_unknown_workflow_is_not_found() {
    let api = Api::new();
    let (status, body) = api.get(&format!("/workflows/{}", WorkflowId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = api.get("/workflows/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_workflows() {
    let api = Api::new();
    let (_, empty) = api.get("/workflows").await;
    assert_eq!(empty, json!([]));

    let id = api.submit(diamond()).await;
    let (status, body) = api.get("/workflows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["workflow_id"], id.to_string());
    assert_eq!(body[0]["name"], "diamond");
}

// ========== Cancellation ==========

/// Test: cancelling a run with batches still ahead
/// Given a workflow whose first task is slow
/// When cancel is requested while it runs
/// Then the response says the run is cancelling and the run ends cancelled
#[tokio::test(start_paused = true)]
async fn test_cancel_workflow() {
    let api = Api::new();
    let id = api
        .submit(json!({"tasks": [
            {"id": "a", "agent": "w", "operation": "slow"},
            {"id": "b", "agent": "w", "operation": "op", "dependsOn": ["a"]}
        ]}))
        .await;

    let (status, body) = api.post(&format!("/workflows/{}/cancel", id), "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["workflow_id"], id.to_string());
    assert_eq!(body["cancelling"], true);

    let result = api.orchestrator.wait(&id).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Cancelled);
}

/// Test: cancelling a run that already finished
/// Given a run that completed successfully
/// When cancel is requested
/// Then the response reports `succeeded` and that nothing will be cancelled
#[tokio::test]
async fn test_cancel_after_completion_reports_final_status() {
    let api = Api::new();
    let id = api.submit(diamond()).await;
    api.orchestrator.wait(&id).await.unwrap();

    let (status, body) = api.post(&format!("/workflows/{}/cancel", id), "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["cancelling"], false);

    let (_, current) = api.get(&format!("/workflows/{}", id)).await;
    assert_eq!(current["status"], "succeeded");
}

#[tokio::test]
async fn test_cancel_unknown_workflow_is_not_found() {
    let api = Api::new();
    let (status, _) = api
        .post(&format!("/workflows/{}/cancel", WorkflowId::new()), "")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ========== Introspection ==========

#[tokio::test]
async fn test_list_agents_reports_health() {
    let api = Api::new();
    let (status, body) = api.get("/agents").await;
    assert_eq!(status, StatusCode::OK);

    let agents = body.as_array().unwrap();
    assert_eq!(agents.len(), 2);
    let sick = agents.iter().find(|a| a["name"] == "sick").unwrap();
    let w = agents.iter().find(|a| a["name"] == "w").unwrap();
    assert_eq!(sick["healthy"], false);
    assert_eq!(w["healthy"], true);
}

#[tokio::test]
async fn test_health() {
    let api = Api::new();
    let (status, body) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
