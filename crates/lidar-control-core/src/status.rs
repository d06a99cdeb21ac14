// lidar-control-core/src/status.rs
// ============================================================================
// Module: Status Lifecycle
// Description: The WorkflowStatus graph and the three outbound event shapes.
// Purpose: Give every component a single, shared vocabulary for ingest
//          progress so the status store projection and the event bus agree.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `WorkflowStatus` values form a directed graph; `WorkflowStatus::can_follow`
//! encodes the only valid transitions so tests can assert that any observed
//! sequence of status writes for a given `workflow_id` is a valid path
//! against the graph.

use serde::Deserialize;
use serde::Serialize;

use crate::ids::WorkflowId;

/// Status values projected into the KV store and published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// The inbound command was received.
    Received,
    /// The inbound command passed validation.
    Validated,
    /// The scenario was resolved to a concrete workflow route.
    ResolvedScenario,
    /// The workflow start call was issued.
    Starting,
    /// The workflow is executing; progress may be polled.
    Running,
    /// The workflow completed successfully.
    Completed,
    /// The workflow failed terminally.
    Failed,
    /// The command is being retried after a transient failure.
    Retrying,
}

impl WorkflowStatus {
    /// Returns true when `next` is a valid successor of `self` in the
    /// `WorkflowStatus` graph.
    #[must_use]
    pub fn can_follow(self, next: Self) -> bool {
        use WorkflowStatus::{
            Completed, Failed, Received, ResolvedScenario, Retrying, Running, Starting, Validated,
        };
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Failed)
                | (Validated, ResolvedScenario)
                | (Validated, Failed)
                | (ResolvedScenario, Starting)
                | (ResolvedScenario, Failed)
                | (Starting, Running)
                | (Starting, Failed)
                | (Starting, Retrying)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Retrying, Starting)
                | (Retrying, Failed)
        )
    }

    /// Returns true for either terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Error codes published on `FailedEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Message shape, missing required artifact kinds, or unknown scenario.
    ValidationError,
    /// The workflow engine rejected the start call.
    TemporalStartError,
    /// The workflow engine reported a failed execution.
    TemporalExecutionError,
}

/// `ingest.status` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Correlated workflow id.
    pub workflow_id: WorkflowId,
    /// Scenario name (`"ingest"`).
    pub scenario: String,
    /// Current status.
    pub status: WorkflowStatus,
    /// Server-generated timestamp (Unix seconds).
    pub timestamp: i64,
    /// Status-specific details payload.
    pub details: serde_json::Value,
}

/// One output artifact reference, as carried on `CompletedEvent::outputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRef {
    /// Output kind (e.g. `derived.merged_point_cloud`).
    pub kind: String,
    /// Object store key.
    pub s3_key: String,
    /// Object ETag. Optional: some upstream paths never observed a
    /// consistent answer on whether this may be null (see `DESIGN.md`).
    pub etag: Option<String>,
}

/// `ingest.complete` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedEvent {
    /// Correlated workflow id.
    pub workflow_id: WorkflowId,
    /// Scenario name.
    pub scenario: String,
    /// Always `WorkflowStatus::Completed`.
    pub status: WorkflowStatus,
    /// Output artifact references.
    pub outputs: Vec<OutputRef>,
}

/// `ingest.failed` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEvent {
    /// Correlated workflow id.
    pub workflow_id: WorkflowId,
    /// Scenario name.
    pub scenario: String,
    /// Always `WorkflowStatus::Failed`.
    pub status: WorkflowStatus,
    /// Error taxonomy code.
    pub error_code: FailureCode,
    /// Human-readable error message.
    pub error_message: String,
    /// Whether the upstream caller should redeliver/replay the command.
    pub retryable: bool,
    /// Timestamp the failure was recorded (Unix seconds).
    pub failed_at: i64,
}

/// Value stored under the status store key; last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current status.
    pub status: WorkflowStatus,
    /// Status-specific payload.
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;
    use crate::status::WorkflowStatus::{
        Completed, Failed, Received, ResolvedScenario, Retrying, Running, Starting, Validated,
    };

    #[test]
    fn happy_path_is_a_valid_graph_walk() {
        let path = [
            Received,
            Validated,
            ResolvedScenario,
            Starting,
            Running,
            Running,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_follow(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn engine_start_failure_is_a_valid_graph_walk() {
        assert!(ResolvedScenario.can_follow(Failed));
        assert!(Starting.can_follow(Failed));
    }

    #[test]
    fn retry_then_start_then_fail_is_valid() {
        assert!(Starting.can_follow(Retrying));
        assert!(Retrying.can_follow(Starting));
        assert!(Retrying.can_follow(Failed));
    }

    #[test]
    fn completed_has_no_successor() {
        for next in [
            Received,
            Validated,
            ResolvedScenario,
            Starting,
            Running,
            Completed,
            Failed,
            Retrying,
        ] {
            assert!(!Completed.can_follow(next));
        }
    }
}
