// lidar-control-core/src/model.rs
// ============================================================================
// Module: Catalog Domain Model
// Description: Plain record structs for every catalog entity.
// Purpose: Provide stable, serializable types shared by every repository
//          implementation and every consumer of catalog data.
// Dependencies: serde, crate::ids
// ============================================================================

//! ## Overview
//! These are plain records, never live ORM/row handles: repository
//! implementations detach rows into these structs before their transaction
//! scope closes, so callers may read fields after the scope exits.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::ids::ArtifactId;
use crate::ids::CompanyId;
use crate::ids::CrsId;
use crate::ids::DatasetId;
use crate::ids::DatasetVersionId;
use crate::ids::IngestRunId;
use crate::ids::ScanId;

/// Root tenant. Created once; never deleted by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Company identifier.
    pub id: CompanyId,
    /// Display name.
    pub name: String,
}

/// Coordinate reference system record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    /// CRS identifier, globally unique.
    pub id: CrsId,
    /// Human-readable name.
    pub name: String,
    /// Zone width in degrees, when applicable to the projection family.
    pub zone_degree: Option<f64>,
    /// EPSG code, when known.
    pub epsg: Option<i32>,
    /// Linear/angular units (`metre`, `degree`, ...).
    pub units: String,
    /// Axis order label (e.g. `enu`, `neu`).
    pub axis_order: String,
    /// Free-form metadata; may carry `wkt` and/or `projjson` blobs.
    pub meta: serde_json::Value,
}

/// A named collection of scans owned by a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset identifier (ULID).
    pub id: DatasetId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Dataset name, unique within the company.
    pub name: String,
    /// CRS the dataset is normalized to.
    pub crs_id: CrsId,
}

/// A monotonic, versioned snapshot of a dataset's scan membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// DatasetVersion identifier (ULID).
    pub id: DatasetVersionId,
    /// Owning dataset.
    pub dataset_id: DatasetId,
    /// Monotonically increasing version number, starting at 1.
    pub version: i64,
    /// Whether this is the dataset's currently active version.
    pub is_active: bool,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
}

/// Scan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// Scan row created; raw artifacts may still be uploading.
    Created,
    /// Scan has at least one ingest run in progress or completed.
    Ingesting,
    /// Scan's manifest has been produced and is available.
    Ingested,
    /// Scan failed ingest and will not be retried without `force`.
    Failed,
}

/// One scanning session: a bundle of raw artifacts plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    /// Scan identifier (ULID).
    pub id: ScanId,
    /// Owning company (must match the dataset-version's dataset).
    pub company_id: CompanyId,
    /// Owning dataset.
    pub dataset_id: DatasetId,
    /// Owning dataset version.
    pub dataset_version_id: DatasetVersionId,
    /// CRS the scan's raw data is described in.
    pub crs_id: CrsId,
    /// Current lifecycle status.
    pub status: ScanStatus,
    /// Schema version of the most recent (or in-flight) ingest manifest.
    pub schema_version: Option<String>,
    /// Optional owning department, for reporting.
    pub owner_department: Option<String>,
    /// Free-form metadata, including `meta.manifest` overrides.
    pub meta: serde_json::Value,
}

/// Well-known artifact kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Raw point cloud payload.
    #[serde(rename = "raw.point_cloud")]
    RawPointCloud,
    /// Raw trajectory payload.
    #[serde(rename = "raw.trajectory")]
    RawTrajectory,
    /// Raw control point payload.
    #[serde(rename = "raw.control_point")]
    RawControlPoint,
    /// Any derived artifact kind, carried verbatim (e.g.
    /// `derived.ingest_manifest`, `derived.reprojected_point_cloud`).
    Derived(String),
}

impl ArtifactKind {
    /// Returns the wire string form of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::RawPointCloud => "raw.point_cloud",
            Self::RawTrajectory => "raw.trajectory",
            Self::RawControlPoint => "raw.control_point",
            Self::Derived(s) => s.as_str(),
        }
    }

    /// Returns true when this is one of the three raw artifact kinds.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            Self::RawPointCloud | Self::RawTrajectory | Self::RawControlPoint
        )
    }

    /// Parses a kind from its wire string form.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "raw.point_cloud" => Self::RawPointCloud,
            "raw.trajectory" => Self::RawTrajectory,
            "raw.control_point" => Self::RawControlPoint,
            other => Self::Derived(other.to_string()),
        }
    }
}

/// Artifact lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    /// Row created before the object upload completed.
    Pending,
    /// Object confirmed present in the object store.
    Available,
    /// Artifact has passed downstream validation (reserved for future use).
    Ready,
    /// Upload never completed; the reconciler found the object absent.
    Failed,
}

/// A persisted file: raw input or derived output, anchored to a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Autoincrement row id.
    pub id: ArtifactId,
    /// Owning company (denormalized for fast authorization checks).
    pub company_id: CompanyId,
    /// Owning scan.
    pub scan_id: ScanId,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Schema version; `None` marks a raw artifact, `Some` a derived one.
    pub schema_version: Option<String>,
    /// Object store bucket.
    pub bucket: String,
    /// Object store key.
    pub key: String,
    /// Object ETag, once known.
    pub etag: Option<String>,
    /// Object size in bytes, once known.
    pub size_bytes: Option<i64>,
    /// Current lifecycle status.
    pub status: ArtifactStatus,
    /// Free-form metadata.
    pub meta: serde_json::Value,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
}

/// Ingest run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestRunStatus {
    /// Queued for claim by a worker.
    Queued,
    /// Claimed and executing.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with a fatal error.
    Failed,
}

/// Structured error recorded on a failed ingest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRunError {
    /// Error taxonomy kind.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Optional trace/context string.
    pub trace: Option<String>,
}

/// One attempt to normalize a scan's raw artifacts into a schema-versioned
/// manifest. Fingerprint-deduped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRun {
    /// Autoincrement row id.
    pub id: IngestRunId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning scan.
    pub scan_id: ScanId,
    /// Target manifest schema version.
    pub schema_version: String,
    /// SHA-256 over the sorted raw artifact projection.
    pub input_fingerprint: String,
    /// Current status.
    pub status: IngestRunStatus,
    /// Error detail, present only when `status == Failed`.
    pub error: Option<IngestRunError>,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
    /// Completion timestamp (Unix seconds), present once terminal.
    pub finished_at: Option<i64>,
}

/// A registration-graph edge proposing that two scans overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEdge {
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning dataset version.
    pub dataset_version_id: DatasetVersionId,
    /// Source scan.
    pub scan_id_from: ScanId,
    /// Target scan.
    pub scan_id_to: ScanId,
    /// Edge kind (e.g. `tail_to_head`, `icp_refined`).
    pub kind: String,
    /// Edge weight; higher is more confident.
    pub weight: f64,
    /// Initial transform guess, as a 4x4 row-major matrix or similar blob.
    pub transform_guess: serde_json::Value,
    /// Free-form metadata.
    pub meta: serde_json::Value,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
    /// Last update timestamp (Unix seconds).
    pub updated_at: i64,
}

/// A rigid-body pose: translation and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Translation vector.
    pub t: [f64; 3],
    /// Rotation matrix, row-major.
    pub r: [[f64; 3]; 3],
}

/// The solved absolute pose for one scan within a dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPose {
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning dataset version.
    pub dataset_version_id: DatasetVersionId,
    /// Owning scan.
    pub scan_id: ScanId,
    /// Solved pose.
    pub pose: Pose,
    /// Solver quality indicator (lower is better, solver-defined scale).
    pub quality: f64,
    /// Free-form metadata (e.g. solver diagnostics).
    pub meta: serde_json::Value,
}

/// A raw artifact upload reference, as carried in the inbound ingest
/// message's `dataset.<scan_id>.<kind>.<k>` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArtifactRef {
    /// S3 object key.
    pub s3_key: String,
    /// Expected ETag.
    pub etag: String,
}

/// The per-scan artifact manifest carried in an inbound ingest command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanArtifactSpec {
    /// Point cloud artifact references, keyed by an opaque local key.
    #[serde(default)]
    pub point_cloud: BTreeMap<String, RawArtifactRef>,
    /// Trajectory artifact references, keyed by an opaque local key.
    #[serde(default)]
    pub trajectory: BTreeMap<String, RawArtifactRef>,
    /// Control point artifact references, keyed by an opaque local key.
    #[serde(default)]
    pub control_point: BTreeMap<String, RawArtifactRef>,
}
