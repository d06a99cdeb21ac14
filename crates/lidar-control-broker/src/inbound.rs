// lidar-control-broker/src/inbound.rs
// ============================================================================
// Module: LiDAR Control Inbound Messages
// Description: `ingest.start` DTO decoding/validation and source abstraction.
// Purpose: Resolve raw broker bytes into a validated, typed ingest command.
// Dependencies: lidar-control-core, reqwest, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`parse_ingest_start`] enforces the wire contract strictly: unknown
//! top-level keys are rejected, every string field must be non-empty, and
//! each scan must carry at least one `point_cloud` reference. Validation
//! failures are the caller's signal to ack the message and publish a
//! `VALIDATION_ERROR` failed-event rather than let it poison-loop through
//! redelivery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;

use lidar_control_core::ids::WorkflowId;
use lidar_control_core::model::ScanArtifactSpec;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Wire DTO
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionSpec {
    message_version: String,
    pipeline_version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct IngestStartMessage {
    workflow_id: String,
    scenario: String,
    version: VersionSpec,
    dataset: BTreeMap<String, ScanArtifactSpec>,
}

/// A validated, typed `ingest.start` command.
#[derive(Debug, Clone)]
pub struct IngestStartCommand {
    /// Correlated workflow id.
    pub workflow_id: WorkflowId,
    /// Scenario name, expected to be `"ingest"`.
    pub scenario: String,
    /// Message schema version, resolved against the scenario registry.
    pub message_version: String,
    /// Pipeline version, resolved against the scenario registry.
    pub pipeline_version: String,
    /// Per-scan raw artifact manifest, keyed by scan id.
    pub dataset: BTreeMap<String, ScanArtifactSpec>,
}

/// Errors raised while decoding or validating an inbound ingest message.
#[derive(Debug, Error)]
pub enum IngestMessageError {
    /// The message body is not valid JSON, or carries unknown top-level keys.
    #[error("invalid ingest.start message: {0}")]
    Decode(String),
    /// A required string field was empty.
    #[error("field must not be empty: {0}")]
    EmptyField(String),
    /// A scan entry carried no `point_cloud` references.
    #[error("scan {0} has no point_cloud artifacts")]
    MissingPointCloud(String),
}

/// Decodes and strictly validates an `ingest.start` message body.
///
/// # Errors
///
/// Returns [`IngestMessageError`] when the body is malformed or any
/// validation rule in the module overview is violated.
pub fn parse_ingest_start(body: &[u8]) -> Result<IngestStartCommand, IngestMessageError> {
    let message: IngestStartMessage =
        serde_json::from_slice(body).map_err(|err| IngestMessageError::Decode(err.to_string()))?;

    require_non_empty(&message.workflow_id, "workflow_id")?;
    require_non_empty(&message.scenario, "scenario")?;
    require_non_empty(&message.version.message_version, "version.message_version")?;
    require_non_empty(&message.version.pipeline_version, "version.pipeline_version")?;

    for (scan_id, spec) in &message.dataset {
        require_non_empty(scan_id, "dataset key")?;
        if spec.point_cloud.is_empty() {
            return Err(IngestMessageError::MissingPointCloud(scan_id.clone()));
        }
        validate_refs(scan_id, "point_cloud", &spec.point_cloud)?;
        validate_refs(scan_id, "trajectory", &spec.trajectory)?;
        validate_refs(scan_id, "control_point", &spec.control_point)?;
    }

    let workflow_id = WorkflowId::new(message.workflow_id)
        .map_err(|_| IngestMessageError::EmptyField("workflow_id".to_string()))?;

    Ok(IngestStartCommand {
        workflow_id,
        scenario: message.scenario,
        message_version: message.version.message_version,
        pipeline_version: message.version.pipeline_version,
        dataset: message.dataset,
    })
}

fn require_non_empty(value: &str, field: &str) -> Result<(), IngestMessageError> {
    if value.trim().is_empty() {
        return Err(IngestMessageError::EmptyField(field.to_string()));
    }
    Ok(())
}

fn validate_refs(
    scan_id: &str,
    kind: &str,
    refs: &BTreeMap<String, lidar_control_core::model::RawArtifactRef>,
) -> Result<(), IngestMessageError> {
    for (local_key, artifact_ref) in refs {
        require_non_empty(local_key, &format!("dataset.{scan_id}.{kind} key"))?;
        require_non_empty(&artifact_ref.s3_key, &format!("dataset.{scan_id}.{kind}.{local_key}.s3_key"))?;
        require_non_empty(&artifact_ref.etag, &format!("dataset.{scan_id}.{kind}.{local_key}.etag"))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Source Abstraction
// ============================================================================

/// Opaque handle identifying one polled message for ack/nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(pub String);

/// One polled, not-yet-decoded inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Handle used to ack or nack this message.
    pub handle: MessageHandle,
    /// Raw message body.
    pub body: Vec<u8>,
}

/// Errors emitted by ingest message sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source's transport failed (HTTP, channel closed, etc).
    #[error("source transport failure: {0}")]
    Transport(String),
}

/// Resolves raw `ingest.start` messages from a broker-like transport.
///
/// Implementations must not buffer messages beyond what the underlying
/// transport already holds; backpressure is the transport's prefetch, not an
/// in-process queue.
pub trait IngestSource: Send + Sync {
    /// Polls for the next available message, if any, without blocking
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure.
    fn poll(&self) -> Result<Option<InboundMessage>, SourceError>;

    /// Acknowledges successful handoff of a message.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure.
    fn ack(&self, handle: &MessageHandle) -> Result<(), SourceError>;

    /// Signals that a message should be redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure.
    fn nack(&self, handle: &MessageHandle) -> Result<(), SourceError>;
}

/// In-process channel source, for tests and one-shot CLI invocations.
///
/// Channel delivery has no redelivery semantics, so `ack`/`nack` are no-ops:
/// a message is either received or it isn't.
pub struct ChannelIngestSource {
    receiver: Mutex<Receiver<Vec<u8>>>,
}

impl ChannelIngestSource {
    /// Creates a channel source over the given receiver.
    #[must_use]
    pub fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self { receiver: Mutex::new(receiver) }
    }
}

impl IngestSource for ChannelIngestSource {
    fn poll(&self) -> Result<Option<InboundMessage>, SourceError> {
        let guard = self.receiver.lock().map_err(|_| SourceError::Transport("channel source mutex poisoned".to_string()))?;
        match guard.try_recv() {
            Ok(body) => Ok(Some(InboundMessage { handle: MessageHandle("channel".to_string()), body })),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SourceError::Transport("channel source disconnected".to_string())),
        }
    }

    fn ack(&self, _handle: &MessageHandle) -> Result<(), SourceError> {
        Ok(())
    }

    fn nack(&self, _handle: &MessageHandle) -> Result<(), SourceError> {
        Ok(())
    }
}

/// HTTP long-poll source against a broker's HTTP consume/ack/nack API.
pub struct HttpPollIngestSource {
    client: reqwest::blocking::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl HttpPollIngestSource {
    /// Creates an HTTP long-poll source against `base_url`, which is expected
    /// to expose `GET {base_url}/poll`, `POST {base_url}/ack/{id}`, and
    /// `POST {base_url}/nack/{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, poll_timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(5))
            .build()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), poll_timeout })
    }
}

impl IngestSource for HttpPollIngestSource {
    fn poll(&self) -> Result<Option<InboundMessage>, SourceError> {
        let response = self
            .client
            .get(format!("{}/poll", self.base_url))
            .query(&[("timeout_ms", self.poll_timeout.as_millis().to_string())])
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|err| SourceError::Transport(err.to_string()))?;
        let id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let body = response.bytes().map_err(|err| SourceError::Transport(err.to_string()))?.to_vec();
        Ok(Some(InboundMessage { handle: MessageHandle(id), body }))
    }

    fn ack(&self, handle: &MessageHandle) -> Result<(), SourceError> {
        self.client
            .post(format!("{}/ack/{}", self.base_url, handle.0))
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        Ok(())
    }

    fn nack(&self, handle: &MessageHandle) -> Result<(), SourceError> {
        self.client
            .post(format!("{}/nack/{}", self.base_url, handle.0))
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use std::sync::mpsc::channel;

    use super::*;

    fn valid_message() -> serde_json::Value {
        serde_json::json!({
            "workflow_id": "wf-1",
            "scenario": "ingest",
            "version": {"message_version": "0", "pipeline_version": "1"},
            "dataset": {
                "scan-1": {
                    "point_cloud": {"a": {"s3_key": "k", "etag": "e"}}
                }
            }
        })
    }

    #[test]
    fn valid_message_parses() {
        let body = serde_json::to_vec(&valid_message()).expect("serialize");
        let command = parse_ingest_start(&body).expect("parse");
        assert_eq!(command.workflow_id.as_str(), "wf-1");
        assert_eq!(command.scenario, "ingest");
        assert_eq!(command.dataset.len(), 1);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let mut value = valid_message();
        value.as_object_mut().expect("object").insert("extra".to_string(), serde_json::json!(true));
        let body = serde_json::to_vec(&value).expect("serialize");
        assert!(matches!(parse_ingest_start(&body), Err(IngestMessageError::Decode(_))));
    }

    #[test]
    fn empty_workflow_id_is_rejected() {
        let mut value = valid_message();
        value["workflow_id"] = serde_json::json!("");
        let body = serde_json::to_vec(&value).expect("serialize");
        assert!(matches!(parse_ingest_start(&body), Err(IngestMessageError::EmptyField(_))));
    }

    #[test]
    fn scan_without_point_cloud_is_rejected() {
        let mut value = valid_message();
        value["dataset"]["scan-1"] = serde_json::json!({"trajectory": {"a": {"s3_key": "k", "etag": "e"}}});
        let body = serde_json::to_vec(&value).expect("serialize");
        assert!(matches!(parse_ingest_start(&body), Err(IngestMessageError::MissingPointCloud(scan)) if scan == "scan-1"));
    }

    #[test]
    fn empty_s3_key_is_rejected() {
        let mut value = valid_message();
        value["dataset"]["scan-1"]["point_cloud"]["a"]["s3_key"] = serde_json::json!("");
        let body = serde_json::to_vec(&value).expect("serialize");
        assert!(matches!(parse_ingest_start(&body), Err(IngestMessageError::EmptyField(_))));
    }

    #[test]
    fn channel_source_round_trips_and_acks_are_no_ops() {
        let (sender, receiver) = channel();
        let source = ChannelIngestSource::new(receiver);
        assert!(source.poll().expect("poll").is_none());
        sender.send(b"payload".to_vec()).expect("send");
        let message = source.poll().expect("poll").expect("present");
        assert_eq!(message.body, b"payload");
        source.ack(&message.handle).expect("ack");
        source.nack(&message.handle).expect("nack");
    }

    #[test]
    fn channel_source_reports_disconnect() {
        let (sender, receiver) = channel();
        let source = ChannelIngestSource::new(receiver);
        drop(sender);
        assert!(source.poll().is_err());
    }
}
