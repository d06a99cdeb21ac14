// lidar-control-providers/src/memory.rs
// ============================================================================
// Module: In-Memory Workflow Gateway
// Description: Deterministic WorkflowGateway for tests and --dry-run.
// Purpose: Exercise the ingest use case and pipeline orchestrator without a
//          live Temporal-equivalent deployment, while still honoring the
//          idempotent-start contract.
// Dependencies: lidar-control-core, std::sync
// ============================================================================

//! ## Overview
//! [`InMemoryWorkflowGateway`] tracks started workflow ids in a map so a
//! second `start_workflow` call with an already-known id is a no-op success,
//! matching the "StartWorkflow must be idempotent on id" contract. Callers
//! may script a one-shot failure for a specific workflow id via
//! [`InMemoryWorkflowGateway::script`], to drive the engine-error test
//! scenarios deterministically.

use std::collections::HashMap;
use std::sync::Mutex;

use lidar_control_core::ids::WorkflowId;
use lidar_control_core::interfaces::WorkflowEngineError;
use lidar_control_core::interfaces::WorkflowGateway;
use serde_json::Value;
use serde_json::json;

/// A one-shot scripted failure or response for a specific workflow id.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// The next `start_workflow` call for this id fails transiently.
    StartTransient(String),
    /// The next `start_workflow` call for this id fails terminally.
    StartTerminal(String),
    /// The next `query_workflow` call for this id fails transiently.
    QueryTransient(String),
    /// The next `wait_result` call for this id fails transiently.
    WaitTransient(String),
    /// The next `wait_result` call for this id fails terminally.
    WaitTerminal(String),
    /// The next `wait_result` call for this id returns this payload instead
    /// of the gateway's default.
    WaitReturns(Value),
}

#[derive(Debug, Clone)]
struct StartedWorkflow {
    workflow_name: String,
    task_queue: String,
    payload: Value,
}

struct GatewayState {
    started: HashMap<String, StartedWorkflow>,
    scripted: HashMap<String, ScriptedOutcome>,
}

/// Deterministic, in-process [`WorkflowGateway`].
pub struct InMemoryWorkflowGateway {
    state: Mutex<GatewayState>,
    default_query_response: Value,
    default_wait_result: Value,
}

impl Default for InMemoryWorkflowGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkflowGateway {
    /// Builds a gateway with empty state and empty default responses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState { started: HashMap::new(), scripted: HashMap::new() }),
            default_query_response: json!({ "stage": "unknown", "scan_ids": [], "dataset_version_id": null }),
            default_wait_result: json!({ "outputs": [] }),
        }
    }

    /// Sets the payload returned by `query_workflow` absent a script.
    #[must_use]
    pub fn with_default_query_response(mut self, value: Value) -> Self {
        self.default_query_response = value;
        self
    }

    /// Sets the payload returned by `wait_result` absent a script.
    #[must_use]
    pub fn with_default_wait_result(mut self, value: Value) -> Self {
        self.default_wait_result = value;
        self
    }

    /// Installs a one-shot scripted outcome for the next matching call on
    /// `workflow_id`.
    ///
    /// # Panics
    ///
    /// Panics only if the internal mutex is poisoned by an earlier panic.
    pub fn script(&self, workflow_id: &WorkflowId, outcome: ScriptedOutcome) {
        let mut state = self.state.lock().expect("in-memory gateway mutex poisoned");
        state.scripted.insert(workflow_id.as_str().to_string(), outcome);
    }

    /// Returns whether `workflow_id` has already been started.
    ///
    /// # Panics
    ///
    /// Panics only if the internal mutex is poisoned by an earlier panic.
    #[must_use]
    pub fn was_started(&self, workflow_id: &WorkflowId) -> bool {
        let state = self.state.lock().expect("in-memory gateway mutex poisoned");
        state.started.contains_key(workflow_id.as_str())
    }

    /// Returns the number of distinct workflow ids ever started, for tests
    /// asserting that a duplicate start did not create a second execution.
    ///
    /// # Panics
    ///
    /// Panics only if the internal mutex is poisoned by an earlier panic.
    #[must_use]
    pub fn started_count(&self) -> usize {
        let state = self.state.lock().expect("in-memory gateway mutex poisoned");
        state.started.len()
    }
}

impl WorkflowGateway for InMemoryWorkflowGateway {
    fn start_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &WorkflowId,
        task_queue: &str,
        payload: &Value,
    ) -> Result<(), WorkflowEngineError> {
        let mut state = self.state.lock().map_err(|_| WorkflowEngineError::Terminal("gateway mutex poisoned".to_string()))?;
        if let Some(ScriptedOutcome::StartTransient(_) | ScriptedOutcome::StartTerminal(_)) =
            state.scripted.get(workflow_id.as_str())
        {
            match state.scripted.remove(workflow_id.as_str()) {
                Some(ScriptedOutcome::StartTransient(message)) => return Err(WorkflowEngineError::Transient(message)),
                Some(ScriptedOutcome::StartTerminal(message)) => return Err(WorkflowEngineError::Terminal(message)),
                _ => unreachable!("matched above"),
            }
        }
        state
            .started
            .entry(workflow_id.as_str().to_string())
            .or_insert_with(|| StartedWorkflow {
                workflow_name: workflow_name.to_string(),
                task_queue: task_queue.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }

    fn query_workflow(&self, workflow_id: &WorkflowId, _query_name: &str) -> Result<Value, WorkflowEngineError> {
        let mut state = self.state.lock().map_err(|_| WorkflowEngineError::Terminal("gateway mutex poisoned".to_string()))?;
        if let Some(ScriptedOutcome::QueryTransient(_)) = state.scripted.get(workflow_id.as_str()) {
            if let Some(ScriptedOutcome::QueryTransient(message)) = state.scripted.remove(workflow_id.as_str()) {
                return Err(WorkflowEngineError::Transient(message));
            }
        }
        Ok(self.default_query_response.clone())
    }

    fn wait_result(&self, workflow_id: &WorkflowId) -> Result<Value, WorkflowEngineError> {
        let mut state = self.state.lock().map_err(|_| WorkflowEngineError::Terminal("gateway mutex poisoned".to_string()))?;
        match state.scripted.remove(workflow_id.as_str()) {
            Some(ScriptedOutcome::WaitTransient(message)) => Err(WorkflowEngineError::Transient(message)),
            Some(ScriptedOutcome::WaitTerminal(message)) => Err(WorkflowEngineError::Terminal(message)),
            Some(ScriptedOutcome::WaitReturns(value)) => Ok(value),
            Some(other) => {
                // Not a wait-relevant script; put it back for its own call site.
                state.scripted.insert(workflow_id.as_str().to_string(), other);
                Ok(self.default_wait_result.clone())
            }
            None => Ok(self.default_wait_result.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    fn wf(id: &str) -> WorkflowId {
        WorkflowId::new(id).expect("workflow id")
    }

    #[test]
    fn start_is_idempotent_on_id() {
        let gateway = InMemoryWorkflowGateway::new();
        let id = wf("wf-1");
        gateway.start_workflow("ingest-1", &id, "queue", &json!({})).expect("start 1");
        gateway.start_workflow("ingest-1", &id, "queue", &json!({})).expect("start 2");
        assert_eq!(gateway.started_count(), 1);
    }

    #[test]
    fn scripted_start_failure_is_one_shot() {
        let gateway = InMemoryWorkflowGateway::new();
        let id = wf("wf-2");
        gateway.script(&id, ScriptedOutcome::StartTransient("boom".to_string()));
        assert!(matches!(
            gateway.start_workflow("ingest-1", &id, "queue", &json!({})),
            Err(WorkflowEngineError::Transient(_))
        ));
        gateway.start_workflow("ingest-1", &id, "queue", &json!({})).expect("retry succeeds");
        assert!(gateway.was_started(&id));
    }

    #[test]
    fn default_wait_result_is_empty_outputs() {
        let gateway = InMemoryWorkflowGateway::new();
        let id = wf("wf-3");
        gateway.start_workflow("ingest-1", &id, "queue", &json!({})).expect("start");
        let result = gateway.wait_result(&id).expect("wait");
        assert_eq!(result, json!({ "outputs": [] }));
    }

    #[test]
    fn scripted_wait_failure_reports_execution_error() {
        let gateway = InMemoryWorkflowGateway::new();
        let id = wf("wf-4");
        gateway.script(&id, ScriptedOutcome::WaitTerminal("activity failed".to_string()));
        assert!(matches!(gateway.wait_result(&id), Err(WorkflowEngineError::Terminal(_))));
    }
}
