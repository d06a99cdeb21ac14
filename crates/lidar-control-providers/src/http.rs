// lidar-control-providers/src/http.rs
// ============================================================================
// Module: HTTP Workflow Gateway
// Description: Blocking HTTP-RPC WorkflowGateway against the durable
//              workflow engine's gateway API.
// Purpose: Translate the three gateway capabilities into HTTP calls bounded
//          by an explicit deadline, classifying failures as transient or
//          terminal for the use case layer.
// Dependencies: lidar-control-core, reqwest
// ============================================================================

//! ## Overview
//! `start_workflow` sends an `Idempotency-Key` header carrying the workflow
//! id so a redelivered start request never creates a duplicate execution on
//! the engine side, per the "StartWorkflow must be idempotent on id"
//! contract. Every call carries its own deadline; a timed-out or
//! connection-level failure is [`WorkflowEngineError::Transient`], anything
//! the engine itself rejected is [`WorkflowEngineError::Terminal`].

use std::time::Duration;

use lidar_control_core::ids::WorkflowId;
use lidar_control_core::interfaces::WorkflowEngineError;
use lidar_control_core::interfaces::WorkflowGateway;
use reqwest::StatusCode;
use reqwest::blocking::Client;

/// Recommended deadline for `StartWorkflow`/`QueryWorkflow` RPCs (§5).
pub const START_QUERY_DEADLINE: Duration = Duration::from_secs(30);

/// Connection parameters for [`HttpWorkflowGateway`].
#[derive(Debug, Clone)]
pub struct HttpWorkflowGatewayConfig {
    /// Base URL of the workflow engine's gateway HTTP API.
    pub base_url: String,
    /// Deadline applied to `start_workflow`/`query_workflow`.
    pub start_query_deadline: Duration,
    /// Deadline applied to `wait_result` (bounded by the upstream workflow's
    /// own timeout in a real deployment).
    pub wait_deadline: Duration,
}

impl HttpWorkflowGatewayConfig {
    /// Builds a config with the recommended deadlines from a base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>, wait_deadline: Duration) -> Self {
        Self { base_url: base_url.into(), start_query_deadline: START_QUERY_DEADLINE, wait_deadline }
    }
}

/// HTTP-RPC [`WorkflowGateway`] against a gateway API exposing
/// `POST {base}/workflows/start`, `GET {base}/workflows/{id}/query`, and
/// `GET {base}/workflows/{id}/result`.
pub struct HttpWorkflowGateway {
    client: Client,
    base_url: String,
    wait_deadline: Duration,
}

impl HttpWorkflowGateway {
    /// Builds a gateway client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowEngineError::Terminal`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: HttpWorkflowGatewayConfig) -> Result<Self, WorkflowEngineError> {
        let client = Client::builder()
            .timeout(config.start_query_deadline.max(config.wait_deadline))
            .build()
            .map_err(|err| WorkflowEngineError::Terminal(err.to_string()))?;
        Ok(Self { client, base_url: config.base_url, wait_deadline: config.wait_deadline })
    }
}

fn classify_reqwest_err(err: &reqwest::Error) -> WorkflowEngineError {
    if err.is_timeout() || err.is_connect() {
        WorkflowEngineError::Transient(err.to_string())
    } else {
        WorkflowEngineError::Terminal(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> WorkflowEngineError {
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        WorkflowEngineError::Transient(format!("{status}: {body}"))
    } else {
        WorkflowEngineError::Terminal(format!("{status}: {body}"))
    }
}

impl WorkflowGateway for HttpWorkflowGateway {
    fn start_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &WorkflowId,
        task_queue: &str,
        payload: &serde_json::Value,
    ) -> Result<(), WorkflowEngineError> {
        let body = serde_json::json!({
            "workflow_name": workflow_name,
            "workflow_id": workflow_id.as_str(),
            "task_queue": task_queue,
            "payload": payload,
        });
        let response = self
            .client
            .post(format!("{}/workflows/start", self.base_url))
            .header("Idempotency-Key", workflow_id.as_str())
            .json(&body)
            .timeout(self.wait_deadline.min(Duration::from_secs(30)))
            .send()
            .map_err(|err| classify_reqwest_err(&err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().unwrap_or_default();
        Err(classify_status(status, text))
    }

    fn query_workflow(&self, workflow_id: &WorkflowId, query_name: &str) -> Result<serde_json::Value, WorkflowEngineError> {
        let response = self
            .client
            .get(format!("{}/workflows/{}/query", self.base_url, workflow_id.as_str()))
            .query(&[("name", query_name)])
            .send()
            .map_err(|err| classify_reqwest_err(&err))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_status(status, text));
        }
        response.json().map_err(|err| classify_reqwest_err(&err))
    }

    fn wait_result(&self, workflow_id: &WorkflowId) -> Result<serde_json::Value, WorkflowEngineError> {
        let response = self
            .client
            .get(format!("{}/workflows/{}/result", self.base_url, workflow_id.as_str()))
            .timeout(self.wait_deadline)
            .send()
            .map_err(|err| classify_reqwest_err(&err))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_status(status, text));
        }
        response.json().map_err(|err| classify_reqwest_err(&err))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    #[test]
    fn transient_classification_matches_5xx_and_429() {
        assert!(matches!(classify_status(StatusCode::BAD_GATEWAY, String::new()), WorkflowEngineError::Transient(_)));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            WorkflowEngineError::Transient(_)
        ));
        assert!(matches!(classify_status(StatusCode::BAD_REQUEST, String::new()), WorkflowEngineError::Terminal(_)));
        assert!(matches!(classify_status(StatusCode::NOT_FOUND, String::new()), WorkflowEngineError::Terminal(_)));
    }
}
