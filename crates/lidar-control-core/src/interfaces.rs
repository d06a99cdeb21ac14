// lidar-control-core/src/interfaces.rs
// ============================================================================
// Module: Backend-Agnostic Interfaces
// Description: Traits every adapter crate implements, and the use cases
//              consume, without embedding backend-specific details.
// Purpose: Define the contract surfaces used by the rest of the control
//          plane (object store, catalog, status store, event bus, workflow
//          engine gateway).
// Dependencies: crate::{ids, model, status}
// ============================================================================

//! ## Overview
//! Implementations must be deterministic given their inputs and fail closed
//! on ambiguous state. None of these traits require `async`: every external
//! call in this system is a single blocking round trip issued from a
//! worker thread or a per-message task, under a cooperative
//! single-logical-task-per-message model.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::ids::ArtifactId;
use crate::ids::CompanyId;
use crate::ids::CrsId;
use crate::ids::DatasetId;
use crate::ids::DatasetVersionId;
use crate::ids::IngestRunId;
use crate::ids::ScanId;
use crate::ids::WorkflowId;
use crate::model::Artifact;
use crate::model::ArtifactKind;
use crate::model::ArtifactStatus;
use crate::model::Company;
use crate::model::Crs;
use crate::model::Dataset;
use crate::model::DatasetVersion;
use crate::model::IngestRun;
use crate::model::IngestRunError;
use crate::model::IngestRunStatus;
use crate::model::Pose;
use crate::model::Scan;
use crate::model::ScanEdge;
use crate::status::CompletedEvent;
use crate::status::FailedEvent;
use crate::status::StatusEvent;
use crate::status::StatusRecord;

// ============================================================================
// SECTION: Object Store Adapter (C2)
// ============================================================================

/// Addresses a single object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl ObjectRef {
    /// Builds a new object reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Result of a successful put/upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// ETag, verbatim from the store, stripped of surrounding quotes.
    pub etag: String,
    /// Object size in bytes.
    pub size_bytes: i64,
}

/// Result of a `head_object` probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadResult {
    /// ETag, if the object exists.
    pub etag: Option<String>,
    /// Size in bytes, if the object exists.
    pub size_bytes: Option<i64>,
}

impl HeadResult {
    /// Returns true when the object was found.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.etag.is_some()
    }
}

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Network or 5xx failure; retryable by the caller.
    #[error("object store transient failure: {0}")]
    Transient(String),
    /// A 4xx failure other than not-found; fatal for the current call.
    #[error("object store fatal failure: {0}")]
    Fatal(String),
    /// Local filesystem I/O failure while staging a file.
    #[error("object store io failure: {0}")]
    Io(String),
}

/// Adapter to an S3-compatible object store.
pub trait ObjectStore: Send + Sync {
    /// Puts a local file as an object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on failure.
    fn put_object(&self, object: &ObjectRef, local_path: &Path) -> Result<PutResult, ObjectStoreError>;

    /// Puts an in-memory byte buffer as an object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on failure.
    fn put_bytes(
        &self,
        object: &ObjectRef,
        body: &[u8],
        content_type: &str,
    ) -> Result<PutResult, ObjectStoreError>;

    /// Uploads a local file, using multipart upload above the configured
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on failure.
    fn upload_file(&self, object: &ObjectRef, local_path: &Path) -> Result<PutResult, ObjectStoreError>;

    /// Fetches an object's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on failure.
    fn get_bytes(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError>;

    /// Downloads an object to a local path.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on failure.
    fn download_file(&self, object: &ObjectRef, local_path: &Path) -> Result<(), ObjectStoreError>;

    /// Probes for an object's existence and metadata.
    ///
    /// Returns `HeadResult { etag: None, size_bytes: None }` on
    /// 404/NoSuchKey/NotFound; propagates other failures as
    /// [`ObjectStoreError`].
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] for failures other than not-found.
    fn head_object(&self, object: &ObjectRef) -> Result<HeadResult, ObjectStoreError>;
}

// ============================================================================
// SECTION: Catalog Repository (C3)
// ============================================================================

/// Catalog repository errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested entity does not exist.
    #[error("catalog entity not found: {0}")]
    NotFound(String),
    /// A uniqueness or state invariant was violated.
    #[error("catalog invariant violated: {0}")]
    Invariant(String),
    /// Underlying storage error.
    #[error("catalog storage error: {0}")]
    Storage(String),
}

/// Raw artifact registration parameters (kind, bucket, key, etag, size, meta).
#[derive(Debug, Clone)]
pub struct NewRawArtifact {
    /// Artifact kind; must be one of the three raw kinds.
    pub kind: ArtifactKind,
    /// Object store bucket.
    pub bucket: String,
    /// Object store key.
    pub key: String,
    /// Object ETag.
    pub etag: String,
    /// Object size in bytes.
    pub size_bytes: i64,
    /// Free-form metadata.
    pub meta: serde_json::Value,
}

/// Derived artifact registration/upsert parameters.
#[derive(Debug, Clone)]
pub struct NewDerivedArtifact {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Manifest/encoding schema version; required for derived artifacts.
    pub schema_version: String,
    /// Object store bucket.
    pub bucket: String,
    /// Object store key.
    pub key: String,
    /// Object ETag, if already known (absent for the PENDING phase).
    pub etag: Option<String>,
    /// Object size in bytes, if already known.
    pub size_bytes: Option<i64>,
    /// Initial/updated status.
    pub status: ArtifactStatus,
    /// Free-form metadata.
    pub meta: serde_json::Value,
}

/// The relational source of truth for the catalog.
pub trait CatalogRepository: Send + Sync {
    /// Inserts the company if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn ensure_company(&self, id: &CompanyId, name: &str) -> Result<Company, CatalogError>;

    /// Inserts the CRS if absent. Immutable once present.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn ensure_crs(&self, crs: &Crs) -> Result<Crs, CatalogError>;

    /// Returns a CRS by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    fn get_crs(&self, id: &CrsId) -> Result<Crs, CatalogError>;

    /// Ensures a dataset exists for `(company, name)`, validating that
    /// `crs_id` (when supplied) agrees with any existing row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invariant`] on a CRS conflict, or
    /// [`CatalogError::Storage`] on failure.
    fn ensure_dataset(
        &self,
        company: &CompanyId,
        name: &str,
        crs_id: Option<&CrsId>,
    ) -> Result<Dataset, CatalogError>;

    /// Returns a dataset by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    fn get_dataset(&self, id: &DatasetId) -> Result<Dataset, CatalogError>;

    /// Returns the current active version, creating version 1 if none
    /// exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn ensure_dataset_version(&self, dataset_id: &DatasetId) -> Result<DatasetVersion, CatalogError>;

    /// Returns a dataset version by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    fn get_dataset_version(&self, id: &DatasetVersionId) -> Result<DatasetVersion, CatalogError>;

    /// Atomically deactivates the current active version and inserts a new
    /// one with `version = prev + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn bump_dataset_version(&self, dataset_id: &DatasetId) -> Result<DatasetVersion, CatalogError>;

    /// Creates a scan, validating that the dataset version's owning dataset
    /// belongs to `company`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invariant`] on a company mismatch.
    fn create_scan(
        &self,
        company: &CompanyId,
        dataset_version_id: &DatasetVersionId,
        crs_id: &CrsId,
    ) -> Result<Scan, CatalogError>;

    /// Returns a scan by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    fn get_scan(&self, id: &ScanId) -> Result<Scan, CatalogError>;

    /// Lists every scan belonging to a dataset version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn list_scans_for_version(&self, dataset_version_id: &DatasetVersionId) -> Result<Vec<Scan>, CatalogError>;

    /// Updates a scan's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the scan is absent.
    fn set_scan_status(&self, id: &ScanId, status: crate::model::ScanStatus) -> Result<(), CatalogError>;

    /// Registers a raw artifact. Rejects a second row for the same
    /// `(scan, kind)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invariant`] on a duplicate raw kind.
    fn register_raw_artifact(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        artifact: &NewRawArtifact,
    ) -> Result<Artifact, CatalogError>;

    /// Registers a derived artifact row. Rejects `schema_version` being
    /// logically absent (the caller must always supply one).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn register_artifact(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        artifact: &NewDerivedArtifact,
    ) -> Result<Artifact, CatalogError>;

    /// Upserts a derived artifact keyed by `(scan, kind, schema_version)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn upsert_derived_artifact(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        artifact: &NewDerivedArtifact,
    ) -> Result<Artifact, CatalogError>;

    /// Lists `AVAILABLE` raw artifacts for a scan.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn list_raw_artifacts(&self, scan_id: &ScanId) -> Result<Vec<Artifact>, CatalogError>;

    /// Returns the latest derived artifact for `(scan, kind, schema_version)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    fn find_derived_artifact(
        &self,
        scan_id: &ScanId,
        kind: &ArtifactKind,
        schema_version: &str,
    ) -> Result<Artifact, CatalogError>;

    /// Lists artifacts in a given status, for reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn list_artifacts_by_status(
        &self,
        status: ArtifactStatus,
        limit: i64,
    ) -> Result<Vec<Artifact>, CatalogError>;

    /// Sets an artifact's status and, when transitioning to `AVAILABLE`,
    /// its etag/size.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the artifact is absent.
    fn set_artifact_status(
        &self,
        id: ArtifactId,
        status: ArtifactStatus,
        etag: Option<&str>,
        size_bytes: Option<i64>,
    ) -> Result<(), CatalogError>;

    /// Looks up an existing ingest run by its logical dedup key.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn find_ingest_run(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        schema_version: &str,
        fingerprint: &str,
    ) -> Result<Option<IngestRun>, CatalogError>;

    /// Creates a new `QUEUED` ingest run.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn create_ingest_run(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        schema_version: &str,
        fingerprint: &str,
    ) -> Result<IngestRun, CatalogError>;

    /// Sets an ingest run's terminal status (last-writer-wins).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the run is absent.
    fn set_ingest_run_status(
        &self,
        id: IngestRunId,
        status: IngestRunStatus,
        error: Option<&IngestRunError>,
    ) -> Result<(), CatalogError>;

    /// Atomically claims a `QUEUED` run, transitioning it to `RUNNING`.
    /// Returns `true` only for the single caller that wins the race.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn claim_ingest_run(&self, id: IngestRunId) -> Result<bool, CatalogError>;

    /// Lists `QUEUED` ingest runs eligible for a worker to claim.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn list_queued_ingest_runs(
        &self,
        schema_version: Option<&str>,
        company: Option<&CompanyId>,
        limit: i64,
    ) -> Result<Vec<IngestRun>, CatalogError>;

    /// Bulk upserts scan edges; on conflict, takes `MAX(weight)` and
    /// overwrites `transform_guess`/`meta`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn add_scan_edges(&self, edges: &[ScanEdge]) -> Result<(), CatalogError>;

    /// Upserts a scan's solved absolute pose.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    fn upsert_scan_pose(
        &self,
        company: &CompanyId,
        dataset_version_id: &DatasetVersionId,
        scan_id: &ScanId,
        pose: &Pose,
        quality: f64,
        meta: serde_json::Value,
    ) -> Result<(), CatalogError>;

    /// Resolves a CRS to the string form PDAL's reprojection filter expects:
    /// prefer `EPSG:<n>`, else `meta.projjson`, else `meta.wkt`, else the
    /// raw CRS id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the CRS is absent.
    fn resolve_crs_to_pdal_srs(&self, crs_id: &CrsId) -> Result<String, CatalogError>;
}

// ============================================================================
// SECTION: Status Store (C8)
// ============================================================================

/// Status store errors.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    /// Underlying storage error.
    #[error("status store error: {0}")]
    Storage(String),
}

/// TTL, in seconds, applied to every status store write.
pub const STATUS_TTL_SECONDS: i64 = 86_400;

/// Per-workflow status projection with TTL; last-write-wins.
pub trait StatusStore: Send + Sync {
    /// Writes the status record for `workflow_id`, resetting its TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StatusStoreError`] on storage failure.
    fn set_status(&self, workflow_id: &WorkflowId, record: &StatusRecord) -> Result<(), StatusStoreError>;

    /// Reads the status record for `workflow_id`, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`StatusStoreError`] on storage failure.
    fn get_status(&self, workflow_id: &WorkflowId) -> Result<Option<StatusRecord>, StatusStoreError>;
}

// ============================================================================
// SECTION: Event Publisher (C9)
// ============================================================================

/// Event publisher errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Underlying transport error.
    #[error("publish error: {0}")]
    Transport(String),
}

/// Publishes the three outbound event shapes with stable routing keys,
/// persistent delivery, and workflow-id correlation.
/// Publishing is fire-and-forget: implementations must not block on broker
/// acknowledgement beyond local success.
pub trait EventPublisher: Send + Sync {
    /// Publishes a status event on `<prefix>.status`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] on local failure to hand off to the broker.
    fn publish_status(&self, event: &StatusEvent) -> Result<(), PublishError>;

    /// Publishes a completed event on `<prefix>.complete`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] on local failure to hand off to the broker.
    fn publish_completed(&self, event: &CompletedEvent) -> Result<(), PublishError>;

    /// Publishes a failed event on `<prefix>.failed`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] on local failure to hand off to the broker.
    fn publish_failed(&self, event: &FailedEvent) -> Result<(), PublishError>;
}

// ============================================================================
// SECTION: Workflow Gateway (C7)
// ============================================================================

/// Workflow engine errors, wrapping the underlying RPC failure.
#[derive(Debug, Error)]
pub enum WorkflowEngineError {
    /// Transient RPC failure (network, timeout, 5xx-equivalent); the caller
    /// may retry the whole command.
    #[error("workflow engine transient error: {0}")]
    Transient(String),
    /// Terminal RPC failure (rejected request, invalid workflow id).
    #[error("workflow engine terminal error: {0}")]
    Terminal(String),
}

impl WorkflowEngineError {
    /// Whether the use case should classify this as retryable for the
    /// purposes of the published `FailedEvent`.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Thin port to the durable workflow engine.
pub trait WorkflowGateway: Send + Sync {
    /// Starts a workflow. Must be idempotent on `workflow_id`: a second
    /// start with an equal id on an already-running workflow returns
    /// success without creating a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowEngineError`] on failure.
    fn start_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &WorkflowId,
        task_queue: &str,
        payload: &serde_json::Value,
    ) -> Result<(), WorkflowEngineError>;

    /// Queries a running workflow's progress.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowEngineError`] on failure.
    fn query_workflow(
        &self,
        workflow_id: &WorkflowId,
        query_name: &str,
    ) -> Result<serde_json::Value, WorkflowEngineError>;

    /// Awaits the workflow's terminal result.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowEngineError`] on failure.
    fn wait_result(&self, workflow_id: &WorkflowId) -> Result<serde_json::Value, WorkflowEngineError>;
}
