// lidar-control-broker/src/publisher.rs
// ============================================================================
// Module: LiDAR Control Event Publisher
// Description: EventPublisher implementations with stable routing keys.
// Purpose: Publish status/complete/failed events, fire-and-forget.
// Dependencies: lidar-control-core, serde_json, std
// ============================================================================

//! ## Overview
//! Every publisher wraps a single message envelope —
//! [`PublishedEvent`] — carrying the routing key, `content_type`,
//! `correlation_id`, and JSON body required by the wire contract.
//! [`LogEventPublisher`] writes one JSON line per event, matching the
//! bundled `EventPublisher` reference implementation. [`ChannelEventPublisher`]
//! hands the same envelope to an in-process channel for tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use lidar_control_core::interfaces::EventPublisher;
use lidar_control_core::interfaces::PublishError;
use lidar_control_core::status::CompletedEvent;
use lidar_control_core::status::FailedEvent;
use lidar_control_core::status::StatusEvent;

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Builds the routing key for a scenario and event suffix, e.g.
/// `routing_key("ingest", "status") == "ingest.status"`.
#[must_use]
pub fn routing_key(scenario: &str, suffix: &str) -> String {
    format!("{scenario}.{suffix}")
}

/// One outbound event envelope, ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishedEvent {
    /// Stable routing key, e.g. `ingest.status`.
    pub routing_key: String,
    /// Always `application/json`.
    pub content_type: &'static str,
    /// Correlated workflow id.
    pub correlation_id: String,
    /// Mirrors `routing_key`, per the wire contract's `type` field.
    pub event_type: String,
    /// Whether this message should be persisted by the broker.
    pub persistent: bool,
    /// Event body.
    pub body: serde_json::Value,
}

impl PublishedEvent {
    fn new(routing_key: String, correlation_id: String, body: serde_json::Value) -> Self {
        Self {
            event_type: routing_key.clone(),
            routing_key,
            content_type: "application/json",
            correlation_id,
            persistent: true,
            body,
        }
    }
}

fn to_published(
    scenario: &str,
    suffix: &str,
    workflow_id: &str,
    body: impl serde::Serialize,
) -> Result<PublishedEvent, PublishError> {
    let body = serde_json::to_value(body).map_err(|err| PublishError::Transport(err.to_string()))?;
    Ok(PublishedEvent::new(routing_key(scenario, suffix), workflow_id.to_string(), body))
}

// ============================================================================
// SECTION: Log Publisher
// ============================================================================

/// Structured-log `EventPublisher`: one JSON line per event.
pub struct LogEventPublisher<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LogEventPublisher<W> {
    /// Creates a log publisher over the given writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    fn write_event(&self, event: &PublishedEvent) -> Result<(), PublishError> {
        let mut guard = self.writer.lock().map_err(|_| PublishError::Transport("log publisher mutex poisoned".to_string()))?;
        serde_json::to_writer(&mut *guard, event).map_err(|err| PublishError::Transport(err.to_string()))?;
        guard.write_all(b"\n").map_err(|err| PublishError::Transport(err.to_string()))?;
        Ok(())
    }
}

impl<W: Write + Send> EventPublisher for LogEventPublisher<W> {
    fn publish_status(&self, event: &StatusEvent) -> Result<(), PublishError> {
        let published = to_published(&event.scenario, "status", event.workflow_id.as_str(), event)?;
        self.write_event(&published)
    }

    fn publish_completed(&self, event: &CompletedEvent) -> Result<(), PublishError> {
        let published = to_published(&event.scenario, "complete", event.workflow_id.as_str(), event)?;
        self.write_event(&published)
    }

    fn publish_failed(&self, event: &FailedEvent) -> Result<(), PublishError> {
        let published = to_published(&event.scenario, "failed", event.workflow_id.as_str(), event)?;
        self.write_event(&published)
    }
}

// ============================================================================
// SECTION: Channel Publisher
// ============================================================================

/// In-process channel `EventPublisher`, for tests.
pub struct ChannelEventPublisher {
    sender: Mutex<Sender<PublishedEvent>>,
}

impl ChannelEventPublisher {
    /// Creates a channel publisher over the given sender.
    #[must_use]
    pub fn new(sender: Sender<PublishedEvent>) -> Self {
        Self { sender: Mutex::new(sender) }
    }

    fn send(&self, event: PublishedEvent) -> Result<(), PublishError> {
        let guard = self.sender.lock().map_err(|_| PublishError::Transport("channel publisher mutex poisoned".to_string()))?;
        guard.send(event).map_err(|err| PublishError::Transport(err.to_string()))
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish_status(&self, event: &StatusEvent) -> Result<(), PublishError> {
        self.send(to_published(&event.scenario, "status", event.workflow_id.as_str(), event)?)
    }

    fn publish_completed(&self, event: &CompletedEvent) -> Result<(), PublishError> {
        self.send(to_published(&event.scenario, "complete", event.workflow_id.as_str(), event)?)
    }

    fn publish_failed(&self, event: &FailedEvent) -> Result<(), PublishError> {
        self.send(to_published(&event.scenario, "failed", event.workflow_id.as_str(), event)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use std::sync::mpsc::channel;

    use lidar_control_core::ids::WorkflowId;
    use lidar_control_core::status::WorkflowStatus;

    use super::*;

    #[test]
    fn routing_key_joins_scenario_and_suffix() {
        assert_eq!(routing_key("ingest", "status"), "ingest.status");
        assert_eq!(routing_key("ingest", "complete"), "ingest.complete");
        assert_eq!(routing_key("ingest", "failed"), "ingest.failed");
    }

    #[test]
    fn log_publisher_writes_one_json_line_per_event() {
        let buffer: Vec<u8> = Vec::new();
        let publisher = LogEventPublisher::new(buffer);
        let event = StatusEvent {
            workflow_id: WorkflowId::new("wf-1").expect("workflow id"),
            scenario: "ingest".to_string(),
            status: WorkflowStatus::Running,
            timestamp: 1,
            details: serde_json::json!({}),
        };
        publisher.publish_status(&event).expect("publish");
        let guard = publisher.writer.lock().expect("lock");
        let text = String::from_utf8(guard.clone()).expect("utf8");
        assert_eq!(text.matches('\n').count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(text.trim_end()).expect("parse");
        assert_eq!(parsed["routing_key"], "ingest.status");
        assert_eq!(parsed["correlation_id"], "wf-1");
        assert_eq!(parsed["content_type"], "application/json");
        assert_eq!(parsed["persistent"], true);
    }

    #[test]
    fn channel_publisher_delivers_completed_event() {
        let (sender, receiver) = channel();
        let publisher = ChannelEventPublisher::new(sender);
        let event = CompletedEvent {
            workflow_id: WorkflowId::new("wf-2").expect("workflow id"),
            scenario: "ingest".to_string(),
            status: WorkflowStatus::Completed,
            outputs: vec![],
        };
        publisher.publish_completed(&event).expect("publish");
        let published = receiver.recv().expect("recv");
        assert_eq!(published.routing_key, "ingest.complete");
        assert_eq!(published.event_type, "ingest.complete");
        assert_eq!(published.correlation_id, "wf-2");
    }
}
