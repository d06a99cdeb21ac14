// lidar-control-broker/src/lib.rs
// ============================================================================
// Crate: lidar-control-broker
// Description: Inbound ingest message decoding and outbound event publishing.
// Purpose: The message-driven front door between the broker and the use
//          cases: typed, strictly-validated inbound DTOs and EventPublisher
//          implementations with stable routing keys.
// Dependencies: lidar-control-core, reqwest, serde, serde_json, thiserror,
//               tracing, url
// ============================================================================

//! ## Overview
//! This crate provides the inbound `ingest.start` source abstraction (with an
//! HTTP long-poll implementation and an in-process channel implementation for
//! tests and one-shot CLI invocations) plus the outbound [`EventPublisher`]
//! implementations (structured log lines, and an in-process channel for
//! tests). Sources and sinks are kept separate so either side can be swapped
//! without touching the other.
//!
//! [`EventPublisher`]: lidar_control_core::interfaces::EventPublisher

pub mod inbound;
pub mod publisher;

pub use inbound::ChannelIngestSource;
pub use inbound::HttpPollIngestSource;
pub use inbound::IngestMessageError;
pub use inbound::IngestSource;
pub use inbound::IngestStartCommand;
pub use inbound::InboundMessage;
pub use inbound::MessageHandle;
pub use inbound::SourceError;
pub use inbound::parse_ingest_start;
pub use publisher::ChannelEventPublisher;
pub use publisher::LogEventPublisher;
pub use publisher::PublishedEvent;
pub use publisher::routing_key;

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "test fixtures use unwrap/expect/panic"
    )]
}
