// lidar-control-orchestrator/src/ingest_use_case.rs
// ============================================================================
// Module: Ingest Use Case (C10)
// Description: The happy-path orchestration for a single ingest.start command.
// Purpose: Resolve the scenario, start the workflow, poll and await its
//          result, and keep the status store and event bus in lockstep at
//          every step.
// Dependencies: lidar-control-core, lidar-control-broker
// ============================================================================

//! ## Overview
//! [`IngestUseCase::run`] walks exactly the seven steps of the happy path:
//! resolve scenario, push `RESOLVED_SCENARIO`, push `STARTING`, start the
//! workflow, query progress and push `RUNNING`, await the result, then push
//! `COMPLETED` and publish the completed event. `RECEIVED`/`VALIDATED` are
//! pushed at entry since this use case is the first thing invoked after
//! message decoding succeeds. Every failure branch publishes the matching
//! `FAILED` event and returns without raising — the only error this function
//! surfaces to its caller is a local failure to write the status store or
//! hand off to the event bus, which the message consumer should treat as
//! transient infrastructure failure and nack for redelivery.

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use lidar_control_broker::IngestStartCommand;
use lidar_control_core::interfaces::EventPublisher;
use lidar_control_core::interfaces::PublishError;
use lidar_control_core::interfaces::StatusStore;
use lidar_control_core::interfaces::StatusStoreError;
use lidar_control_core::interfaces::WorkflowGateway;
use lidar_control_core::scenario::ScenarioRegistry;
use lidar_control_core::status::CompletedEvent;
use lidar_control_core::status::FailedEvent;
use lidar_control_core::status::FailureCode;
use lidar_control_core::status::OutputRef;
use lidar_control_core::status::StatusEvent;
use lidar_control_core::status::StatusRecord;
use lidar_control_core::status::WorkflowStatus;
use thiserror::Error;
use tracing::info;
use tracing::warn;

/// Errors raised by a local failure to record or publish an event; these are
/// not part of the happy/failure-path taxonomy of the use case itself.
#[derive(Debug, Error)]
pub enum UseCaseError {
    /// The status store write failed.
    #[error(transparent)]
    Status(#[from] StatusStoreError),
    /// The event bus hand-off failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// The workflow engine's terminal result did not carry a well-formed
    /// `outputs` array.
    #[error("workflow result had malformed outputs: {0}")]
    MalformedResult(String),
}

/// Terminal outcome of one [`IngestUseCase::run`] call, used by the message
/// consumer to decide whether to ack or nack the inbound message.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The workflow completed successfully.
    Completed {
        /// Output artifact references from the workflow result.
        outputs: Vec<OutputRef>,
    },
    /// The scenario could not be resolved; the message should be acked (not
    /// redelivered) since redelivery can never succeed.
    ValidationFailed,
    /// The workflow engine rejected the start call, the progress query, or
    /// the terminal wait; `retryable` mirrors the published `FailedEvent`.
    EngineFailed {
        /// Whether the upstream caller should redeliver/replay the command.
        retryable: bool,
    },
}

fn now_secs() -> i64 {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Orchestrates a single ingest command through scenario resolution,
/// workflow start, progress polling, and result mapping.
pub struct IngestUseCase {
    scenario_registry: ScenarioRegistry,
    gateway: Arc<dyn WorkflowGateway>,
    status_store: Arc<dyn StatusStore>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl IngestUseCase {
    /// Builds a use case over the given scenario registry and adapters.
    #[must_use]
    pub fn new(
        scenario_registry: ScenarioRegistry,
        gateway: Arc<dyn WorkflowGateway>,
        status_store: Arc<dyn StatusStore>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { scenario_registry, gateway, status_store, event_publisher }
    }

    fn push_status(
        &self,
        command: &IngestStartCommand,
        status: WorkflowStatus,
        details: serde_json::Value,
    ) -> Result<(), UseCaseError> {
        self.status_store.set_status(&command.workflow_id, &StatusRecord { status, payload: details.clone() })?;
        self.event_publisher.publish_status(&StatusEvent {
            workflow_id: command.workflow_id.clone(),
            scenario: command.scenario.clone(),
            status,
            timestamp: now_secs(),
            details,
        })?;
        Ok(())
    }

    fn push_failed(
        &self,
        command: &IngestStartCommand,
        error_code: FailureCode,
        error_message: String,
        retryable: bool,
    ) -> Result<(), UseCaseError> {
        warn!(workflow_id = command.workflow_id.as_str(), ?error_code, retryable, "ingest use case failed");
        self.status_store.set_status(
            &command.workflow_id,
            &StatusRecord {
                status: WorkflowStatus::Failed,
                payload: serde_json::json!({ "error_code": error_code, "error_message": error_message }),
            },
        )?;
        self.event_publisher.publish_failed(&FailedEvent {
            workflow_id: command.workflow_id.clone(),
            scenario: command.scenario.clone(),
            status: WorkflowStatus::Failed,
            error_code,
            error_message,
            retryable,
            failed_at: now_secs(),
        })?;
        Ok(())
    }

    /// Runs the happy path for `command`, returning the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`UseCaseError`] only when the status store or event bus
    /// itself could not be written to; the engine/validation failure paths
    /// are reported via the returned [`IngestOutcome`], not as an `Err`.
    pub fn run(&self, command: &IngestStartCommand) -> Result<IngestOutcome, UseCaseError> {
        self.push_status(command, WorkflowStatus::Received, serde_json::json!({}))?;
        self.push_status(command, WorkflowStatus::Validated, serde_json::json!({}))?;

        let route = match self.scenario_registry.resolve(&command.scenario, &command.pipeline_version) {
            Ok(route) => route.clone(),
            Err(err) => {
                self.push_failed(command, FailureCode::ValidationError, err.to_string(), false)?;
                return Ok(IngestOutcome::ValidationFailed);
            }
        };
        self.push_status(
            command,
            WorkflowStatus::ResolvedScenario,
            serde_json::json!({ "workflow_name": route.workflow_type }),
        )?;

        let payload = serde_json::json!({
            "message_version": command.message_version,
            "pipeline_version": command.pipeline_version,
            "dataset": command.dataset,
        });
        self.push_status(command, WorkflowStatus::Starting, serde_json::json!({ "payload": payload }))?;

        if let Err(err) = self.gateway.start_workflow(&route.workflow_type, &command.workflow_id, &route.task_queue, &payload) {
            let retryable = err.retryable();
            self.push_failed(command, FailureCode::TemporalStartError, err.to_string(), retryable)?;
            return Ok(IngestOutcome::EngineFailed { retryable });
        }

        let progress = match self.gateway.query_workflow(&command.workflow_id, &route.progress_query) {
            Ok(progress) => progress,
            Err(err) => {
                let retryable = err.retryable();
                self.push_failed(command, FailureCode::TemporalExecutionError, err.to_string(), retryable)?;
                return Ok(IngestOutcome::EngineFailed { retryable });
            }
        };
        self.push_status(command, WorkflowStatus::Running, progress)?;

        let result = match self.gateway.wait_result(&command.workflow_id) {
            Ok(result) => result,
            Err(err) => {
                let retryable = err.retryable();
                self.push_failed(command, FailureCode::TemporalExecutionError, err.to_string(), retryable)?;
                return Ok(IngestOutcome::EngineFailed { retryable });
            }
        };

        let outputs: Vec<OutputRef> = match result.get("outputs") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| UseCaseError::MalformedResult(err.to_string()))?,
            None => Vec::new(),
        };

        self.push_status(command, WorkflowStatus::Completed, serde_json::json!({ "outputs": outputs }))?;
        self.event_publisher.publish_completed(&CompletedEvent {
            workflow_id: command.workflow_id.clone(),
            scenario: command.scenario.clone(),
            status: WorkflowStatus::Completed,
            outputs: outputs.clone(),
        })?;
        info!(workflow_id = command.workflow_id.as_str(), "ingest use case completed");
        Ok(IngestOutcome::Completed { outputs })
    }
}
