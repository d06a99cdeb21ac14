// lidar-control-providers/src/lib.rs
// ============================================================================
// Crate: lidar-control-providers
// Description: WorkflowGateway implementations (C7).
// Purpose: Thin ports to the durable workflow engine: an HTTP-RPC gateway for
//          production deployments and a deterministic in-memory gateway for
//          tests and the CLI's `--dry-run` mode.
// Dependencies: lidar-control-core, reqwest, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`WorkflowGateway`] is the seam between the control plane and whatever
//! durable workflow engine actually runs the pipeline orchestrator (Temporal
//! in the source system). This crate ships two implementations: one that
//! speaks to a gateway HTTP API, and one that is fully in-process and
//! deterministic, for tests and for operators who want to exercise the
//! ingest use case without a live engine.
//!
//! [`WorkflowGateway`]: lidar_control_core::interfaces::WorkflowGateway

pub mod http;
pub mod memory;

pub use http::HttpWorkflowGateway;
pub use memory::InMemoryWorkflowGateway;
pub use memory::ScriptedOutcome;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
}
