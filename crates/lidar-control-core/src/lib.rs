// lidar-control-core/src/lib.rs
// ============================================================================
// Crate: lidar-control-core
// Description: Backend-agnostic domain model, traits, and pure logic for the
//              LiDAR point-cloud ingest/orchestration control plane.
// ============================================================================

//! ## Overview
//! This crate has no I/O of its own: identifiers, the catalog domain model,
//! status lifecycle, hashing/fingerprinting, CRS normalization, the scenario
//! registry, and the backend-agnostic traits every adapter crate implements.
//! Everything here compiles and tests without a database, an object store, or
//! a workflow engine reachable.

pub mod crs;
pub mod hashing;
pub mod ids;
pub mod interfaces;
pub mod model;
pub mod scenario;
pub mod status;

pub use hashing::FingerprintArtifact;
pub use hashing::HashError;
pub use hashing::compute_fingerprint;
pub use hashing::hex_sha256;
pub use ids::ArtifactId;
pub use ids::CompanyId;
pub use ids::CrsId;
pub use ids::DatasetId;
pub use ids::DatasetVersionId;
pub use ids::IngestRunId;
pub use ids::ScanId;
pub use ids::WorkflowId;
pub use ids::WorkflowIdError;
pub use interfaces::CatalogError;
pub use interfaces::CatalogRepository;
pub use interfaces::EventPublisher;
pub use interfaces::HeadResult;
pub use interfaces::NewDerivedArtifact;
pub use interfaces::NewRawArtifact;
pub use interfaces::ObjectRef;
pub use interfaces::ObjectStore;
pub use interfaces::ObjectStoreError;
pub use interfaces::PublishError;
pub use interfaces::PutResult;
pub use interfaces::STATUS_TTL_SECONDS;
pub use interfaces::StatusStore;
pub use interfaces::StatusStoreError;
pub use interfaces::WorkflowEngineError;
pub use interfaces::WorkflowGateway;
pub use model::Artifact;
pub use model::ArtifactKind;
pub use model::ArtifactStatus;
pub use model::Company;
pub use model::Crs;
pub use model::Dataset;
pub use model::DatasetVersion;
pub use model::IngestRun;
pub use model::IngestRunError;
pub use model::IngestRunStatus;
pub use model::Pose;
pub use model::RawArtifactRef;
pub use model::Scan;
pub use model::ScanArtifactSpec;
pub use model::ScanEdge;
pub use model::ScanPose;
pub use model::ScanStatus;
pub use scenario::ScenarioRegistry;
pub use scenario::ScenarioRoute;
pub use scenario::UnsupportedScenarioError;
pub use status::CompletedEvent;
pub use status::FailedEvent;
pub use status::FailureCode;
pub use status::OutputRef;
pub use status::StatusEvent;
pub use status::StatusRecord;
pub use status::WorkflowStatus;
