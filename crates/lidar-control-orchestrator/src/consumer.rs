// lidar-control-orchestrator/src/consumer.rs
// ============================================================================
// Module: Message Consumer (C14)
// Description: Wires an IngestSource to the ingest use case and decides
//              ack/nack from the resulting outcome.
// Purpose: Keep the poison-loop-prevention rule — validation failures are
//          acked with a published FailedEvent, engine/infrastructure
//          failures are nacked for redelivery — in exactly one place.
// Dependencies: lidar-control-core, lidar-control-broker
// ============================================================================

//! ## Overview
//! A message that fails to decode at all (malformed JSON, missing required
//! field) never reaches [`IngestUseCase::run`] and so never gets a
//! correlated `FailedEvent` — there is no `workflow_id` to hang one on. It is
//! still acked, for the same poison-loop-prevention reason `spec.md` gives
//! for scenario-resolution validation failures, and the drop is logged.
//! Every other terminal [`IngestOutcome`] maps to ack (`Completed`,
//! `ValidationFailed`) or nack (`EngineFailed`) exactly as `spec.md` §4.11
//! prescribes.

use std::sync::Arc;

use lidar_control_broker::IngestSource;
use lidar_control_broker::SourceError;
use lidar_control_broker::parse_ingest_start;
use thiserror::Error;
use tracing::warn;

use crate::ingest_use_case::IngestOutcome;
use crate::ingest_use_case::IngestUseCase;
use crate::ingest_use_case::UseCaseError;

/// Errors raised by the consumer loop itself (transport or local
/// infrastructure failure); a malformed message or a use-case-reported
/// engine failure are not errors here, they are [`ConsumerOutcome`] values.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The source's poll/ack/nack call failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The use case could not write the status store or event bus.
    #[error(transparent)]
    UseCase(#[from] UseCaseError),
}

/// Outcome of one [`IngestConsumer::poll_and_process_once`] call.
#[derive(Debug, Clone)]
pub enum ConsumerOutcome {
    /// No message was available.
    Empty,
    /// The message was malformed and was dropped (acked, not redelivered).
    Dropped {
        /// Why decoding failed.
        reason: String,
    },
    /// The message was decoded and handed to the ingest use case.
    Processed(IngestOutcome),
}

/// Pulls `ingest.start` messages from a source and drives them through the
/// ingest use case, acking or nacking based on the outcome.
pub struct IngestConsumer {
    source: Arc<dyn IngestSource>,
    use_case: Arc<IngestUseCase>,
}

impl IngestConsumer {
    /// Builds a consumer over the given source and use case.
    #[must_use]
    pub fn new(source: Arc<dyn IngestSource>, use_case: Arc<IngestUseCase>) -> Self {
        Self { source, use_case }
    }

    /// Polls once and, if a message was available, decodes and processes it.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] on source transport failure or on a local
    /// status-store/event-bus write failure inside the use case.
    pub fn poll_and_process_once(&self) -> Result<ConsumerOutcome, ConsumerError> {
        let Some(message) = self.source.poll()? else {
            return Ok(ConsumerOutcome::Empty);
        };

        let command = match parse_ingest_start(&message.body) {
            Ok(command) => command,
            Err(err) => {
                warn!(error = %err, "dropping malformed ingest.start message");
                self.source.ack(&message.handle)?;
                return Ok(ConsumerOutcome::Dropped { reason: err.to_string() });
            }
        };

        let outcome = self.use_case.run(&command)?;
        match &outcome {
            IngestOutcome::Completed { .. } | IngestOutcome::ValidationFailed => {
                self.source.ack(&message.handle)?;
            }
            IngestOutcome::EngineFailed { .. } => {
                self.source.nack(&message.handle)?;
            }
        }
        Ok(ConsumerOutcome::Processed(outcome))
    }

    /// Repeatedly calls [`Self::poll_and_process_once`] until the source
    /// reports empty or `max_messages` have been processed, whichever comes
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] on the first failing call.
    pub fn drain(&self, max_messages: u64) -> Result<Vec<ConsumerOutcome>, ConsumerError> {
        let mut outcomes = Vec::new();
        for _ in 0..max_messages {
            match self.poll_and_process_once()? {
                ConsumerOutcome::Empty => break,
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    }
}
