// lidar-control-orchestrator/src/pipeline.rs
// ============================================================================
// Module: Pipeline Orchestrator (C13)
// Description: The dataset-version-wide DAG: ingest -> profiling -> reproject
//              -> preprocess -> registration -> export -> optional cluster.
// Purpose: Preserve the DAG shape, the progress query contract, and every
//          catalog/object-store side effect a real workflow-engine run would
//          produce, without reimplementing the numerical activities
//          (PDAL/Open3D/RANSAC) those stages would call in production.
// Dependencies: lidar-control-core
// ============================================================================

//! ## Overview
//! This module plays the role normally owned by the durable workflow engine
//! and its activities: in production those run as a Temporal-equivalent
//! workflow definition dispatching to worker-hosted activities. Here every
//! activity is a typed stub — it validates inputs and performs the real
//! catalog/object-store bookkeeping a production activity would (registering
//! a derived artifact row, persisting edges and poses, advancing `progress`)
//! but computes a deterministic placeholder payload instead of running real
//! point cloud math. [`PipelineOrchestrator::progress`] answers the same
//! `{stage, scan_ids, dataset_version_id}` shape a `query_workflow` call
//! against a live engine would return.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use lidar_control_core::hashing::hex_sha256;
use lidar_control_core::ids::CompanyId;
use lidar_control_core::ids::CrsId;
use lidar_control_core::ids::DatasetVersionId;
use lidar_control_core::ids::ScanId;
use lidar_control_core::interfaces::CatalogError;
use lidar_control_core::interfaces::CatalogRepository;
use lidar_control_core::model::ArtifactKind;
use lidar_control_core::model::Pose;
use lidar_control_core::model::Scan;
use lidar_control_core::model::ScanEdge;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::artifact_service::ArtifactService;
use crate::artifact_service::ArtifactServiceError;
use crate::artifact_service::derived_cloud_key;
use crate::artifact_service::key_prefix;
use crate::ingest_run_fsm::IngestRunFsm;
use crate::ingest_run_fsm::IngestRunFsmError;

const EDGE_DISTANCE_THRESHOLD_M: f64 = 20.0;

/// Errors raised while running the pipeline DAG.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A catalog call failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The artifact service failed while registering a derived artifact.
    #[error(transparent)]
    Artifact(#[from] ArtifactServiceError),
    /// The ingest run FSM failed for one of the scans.
    #[error(transparent)]
    IngestRun(#[from] IngestRunFsmError),
    /// The command listed scans that do not all share one dataset version.
    #[error("scans in one pipeline command must share a single dataset version")]
    MixedDatasetVersion,
    /// The command listed no scans.
    #[error("pipeline command must list at least one scan")]
    EmptyScanSet,
}

/// A DAG stage, as reported by the `progress` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Not yet started.
    Pending,
    /// Running per-scan ingest (C10/C11).
    Ingest,
    /// Running per-scan profiling.
    Profiling,
    /// Running dataset-level reprojection.
    Reproject,
    /// Running dataset-level preprocessing.
    Preprocess,
    /// Building the registration graph and solving absolute poses.
    Registration,
    /// Merging per-scan clouds into one exported cloud.
    Export,
    /// Optional post-export clustering.
    Cluster,
    /// All stages complete.
    Done,
}

/// The `{stage, scan_ids, dataset_version_id}` progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineProgress {
    /// Current DAG stage.
    pub stage: PipelineStage,
    /// Scan ids in this pipeline run.
    pub scan_ids: Vec<ScanId>,
    /// The dataset version all scans share, once known.
    pub dataset_version_id: Option<DatasetVersionId>,
}

/// A pipeline command: one dataset-version worth of scans to carry through
/// the full DAG.
#[derive(Debug, Clone)]
pub struct PipelineCommand {
    /// Owning company.
    pub company: CompanyId,
    /// Target CRS for the reproject stage.
    pub target_crs_id: CrsId,
    /// Manifest schema version to use for the ingest stage.
    pub schema_version: String,
    /// Scans to process; must all share one dataset version.
    pub scan_ids: Vec<ScanId>,
    /// Whether to run the optional cluster stage after export.
    pub run_cluster: bool,
}

/// Terminal result of one [`PipelineOrchestrator::run`] call.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The shared dataset version processed.
    pub dataset_version_id: DatasetVersionId,
    /// Key of the exported merged point cloud artifact.
    pub merged_artifact_key: String,
    /// Whether the cluster stage ran.
    pub clustered: bool,
}

fn deterministic_point(seed: &str) -> [f64; 3] {
    let digest = hex_sha256(seed.as_bytes());
    let chunk = |offset: usize| -> f64 {
        let hex_chunk = &digest[offset..offset + 8];
        let value = u32::from_str_radix(hex_chunk, 16).unwrap_or(0);
        (f64::from(value) / f64::from(u32::MAX)) * 100.0
    };
    [chunk(0), chunk(8), chunk(16)]
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn identity_pose() -> Pose {
    Pose { t: [0.0, 0.0, 0.0], r: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] }
}

fn translation_pose(t: [f64; 3]) -> Pose {
    Pose { t, r: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] }
}

fn mat3_vec_mul(m: [[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat3_mul(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, cell) in out_row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[row][k] * b[k][col]).sum();
        }
    }
    out
}

fn compose(parent: &Pose, relative: &Pose) -> Pose {
    let t = mat3_vec_mul(parent.r, relative.t);
    Pose { t: [t[0] + parent.t[0], t[1] + parent.t[1], t[2] + parent.t[2]], r: mat3_mul(parent.r, relative.r) }
}

/// Drives the dataset-version DAG over a [`CatalogRepository`], an
/// [`ArtifactService`], and an [`IngestRunFsm`].
pub struct PipelineOrchestrator {
    catalog: Arc<dyn CatalogRepository>,
    artifacts: Arc<ArtifactService>,
    ingest_fsm: Arc<IngestRunFsm>,
    bucket: String,
    progress: Mutex<PipelineProgress>,
}

impl PipelineOrchestrator {
    /// Builds an orchestrator over the given adapters.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        artifacts: Arc<ArtifactService>,
        ingest_fsm: Arc<IngestRunFsm>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            artifacts,
            ingest_fsm,
            bucket: bucket.into(),
            progress: Mutex::new(PipelineProgress { stage: PipelineStage::Pending, scan_ids: Vec::new(), dataset_version_id: None }),
        }
    }

    /// Returns the current progress snapshot.
    ///
    /// # Panics
    ///
    /// Panics only if the internal mutex is poisoned by an earlier panic.
    #[must_use]
    pub fn progress(&self) -> PipelineProgress {
        self.progress.lock().expect("progress mutex poisoned").clone()
    }

    fn set_stage(&self, stage: PipelineStage, scan_ids: &[ScanId], dataset_version_id: Option<DatasetVersionId>) {
        let mut guard = self.progress.lock().expect("progress mutex poisoned");
        guard.stage = stage;
        guard.scan_ids = scan_ids.to_vec();
        guard.dataset_version_id = dataset_version_id;
    }

    /// Runs every stage of the DAG for `command`, returning the merged
    /// export's artifact key.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MixedDatasetVersion`] if the scans do not
    /// share one dataset version, [`PipelineError::EmptyScanSet`] if the
    /// command lists no scans, or a wrapped adapter error from any stage.
    pub fn run(&self, command: &PipelineCommand) -> Result<PipelineOutcome, PipelineError> {
        if command.scan_ids.is_empty() {
            return Err(PipelineError::EmptyScanSet);
        }
        let scans: Vec<Scan> = command.scan_ids.iter().map(|id| self.catalog.get_scan(id)).collect::<Result<_, _>>()?;
        let dataset_version_id = scans[0].dataset_version_id;
        if scans.iter().any(|s| s.dataset_version_id != dataset_version_id) {
            return Err(PipelineError::MixedDatasetVersion);
        }

        self.set_stage(PipelineStage::Ingest, &command.scan_ids, Some(dataset_version_id));
        for scan in &scans {
            let run = self.ingest_fsm.submit(&command.company, &scan.id, &command.schema_version, false)?;
            self.ingest_fsm.claim_and_execute(&run)?;
        }

        self.set_stage(PipelineStage::Profiling, &command.scan_ids, Some(dataset_version_id));
        for scan in &scans {
            self.run_profiling(scan)?;
        }

        self.set_stage(PipelineStage::Reproject, &command.scan_ids, Some(dataset_version_id));
        for scan in &scans {
            self.run_reproject(scan, &command.target_crs_id)?;
        }

        self.set_stage(PipelineStage::Preprocess, &command.scan_ids, Some(dataset_version_id));
        for scan in &scans {
            self.run_preprocess(scan)?;
        }

        self.set_stage(PipelineStage::Registration, &command.scan_ids, Some(dataset_version_id));
        self.run_registration(&command.company, dataset_version_id, &scans)?;

        self.set_stage(PipelineStage::Export, &command.scan_ids, Some(dataset_version_id));
        let merged_artifact_key = self.run_export(&command.company, &command.schema_version, &scans)?;

        let clustered = command.run_cluster;
        if clustered {
            self.set_stage(PipelineStage::Cluster, &command.scan_ids, Some(dataset_version_id));
            self.run_cluster(&command.company, &command.schema_version, &scans[0], &merged_artifact_key)?;
        }

        self.set_stage(PipelineStage::Done, &command.scan_ids, Some(dataset_version_id));
        info!(dataset_version_id = %dataset_version_id, scans = scans.len(), "pipeline run complete");
        Ok(PipelineOutcome { dataset_version_id, merged_artifact_key, clustered })
    }

    fn run_profiling(&self, scan: &Scan) -> Result<(), PipelineError> {
        let schema_version = scan.schema_version.as_deref().unwrap_or("1");
        let prefix = key_prefix(&scan.company_id, &scan.dataset_version_id, &scan.id);
        let key = format!("{prefix}/derived/v{schema_version}/profile/stats.json");
        let body = serde_json::to_vec(&json!({ "scan_id": scan.id.to_string(), "hexbin_cells": 0, "point_count_estimate": 0 })).unwrap_or_default();
        self.artifacts.upsert_derived_bytes(
            &scan.company_id,
            scan,
            schema_version,
            ArtifactKind::Derived("derived.profile".to_string()),
            key,
            &body,
            "application/json",
            json!({}),
        )?;
        Ok(())
    }

    fn run_reproject(&self, scan: &Scan, target_crs_id: &CrsId) -> Result<(), PipelineError> {
        let schema_version = scan.schema_version.as_deref().unwrap_or("1");
        let prefix = key_prefix(&scan.company_id, &scan.dataset_version_id, &scan.id);
        let key = derived_cloud_key(&prefix, schema_version, "reprojected", "cloud.laz");
        let body = serde_json::to_vec(&json!({ "scan_id": scan.id.to_string(), "target_crs_id": target_crs_id.to_string() })).unwrap_or_default();
        self.artifacts.upsert_derived_bytes(
            &scan.company_id,
            scan,
            schema_version,
            ArtifactKind::Derived("derived.reprojected_point_cloud".to_string()),
            key,
            &body,
            "application/octet-stream",
            json!({}),
        )?;
        Ok(())
    }

    fn run_preprocess(&self, scan: &Scan) -> Result<(), PipelineError> {
        let schema_version = scan.schema_version.as_deref().unwrap_or("1");
        let prefix = key_prefix(&scan.company_id, &scan.dataset_version_id, &scan.id);
        let key = derived_cloud_key(&prefix, schema_version, "preprocessed", "cloud.laz");
        let body = serde_json::to_vec(&json!({ "scan_id": scan.id.to_string(), "voxel_size_m": 0.05 })).unwrap_or_default();
        self.artifacts.upsert_derived_bytes(
            &scan.company_id,
            scan,
            schema_version,
            ArtifactKind::Derived("derived.preprocessed_point_cloud".to_string()),
            key,
            &body,
            "application/octet-stream",
            json!({}),
        )?;
        Ok(())
    }

    fn run_registration(&self, company: &CompanyId, dataset_version_id: DatasetVersionId, scans: &[Scan]) -> Result<(), PipelineError> {
        let anchors: HashMap<ScanId, ([f64; 3], [f64; 3])> = scans
            .iter()
            .map(|scan| {
                let head = deterministic_point(&format!("{}:head", scan.id));
                let tail = deterministic_point(&format!("{}:tail", scan.id));
                (scan.id, (head, tail))
            })
            .collect();

        let mut edges = Vec::new();
        let mut adjacency: HashMap<ScanId, Vec<(ScanId, Pose, f64)>> = HashMap::new();
        for from in scans {
            let (_, tail) = anchors[&from.id];
            for to in scans {
                if from.id == to.id {
                    continue;
                }
                let (head, _) = anchors[&to.id];
                let d = distance(tail, head);
                if d < EDGE_DISTANCE_THRESHOLD_M {
                    let weight = (EDGE_DISTANCE_THRESHOLD_M / d).max(0.1);
                    let relative_translation = [head[0] - tail[0], head[1] - tail[1], head[2] - tail[2]];
                    let edge_pose = translation_pose(relative_translation);
                    edges.push(ScanEdge {
                        company_id: company.clone(),
                        dataset_version_id,
                        scan_id_from: from.id,
                        scan_id_to: to.id,
                        kind: "tail_to_head".to_string(),
                        weight,
                        transform_guess: json!({ "t": relative_translation }),
                        meta: json!({}),
                        created_at: 0,
                        updated_at: 0,
                    });
                    adjacency.entry(from.id).or_default().push((to.id, edge_pose, weight));
                }
            }
        }
        if !edges.is_empty() {
            self.catalog.add_scan_edges(&edges)?;
        }

        let root = scans[0].id;
        let mut solved: HashMap<ScanId, (Pose, f64)> = HashMap::new();
        solved.insert(root, (identity_pose(), 0.0));
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(current) = queue.pop_front() {
            let (current_pose, current_quality) = solved[&current];
            if let Some(neighbors) = adjacency.get(&current) {
                for (next, edge_pose, weight) in neighbors {
                    if solved.contains_key(next) {
                        continue;
                    }
                    let next_pose = compose(&current_pose, edge_pose);
                    let next_quality = current_quality + (1.0 / weight);
                    solved.insert(*next, (next_pose, next_quality));
                    queue.push_back(*next);
                }
            }
        }
        for scan in scans {
            let (pose, quality) = solved.get(&scan.id).copied().unwrap_or((identity_pose(), f64::INFINITY));
            let meta = if solved.contains_key(&scan.id) { json!({}) } else { json!({ "diagnostic": "unreachable_from_root_default_identity" }) };
            self.catalog.upsert_scan_pose(company, &dataset_version_id, &scan.id, &pose, quality, meta)?;
        }
        Ok(())
    }

    fn run_export(&self, company: &CompanyId, schema_version: &str, scans: &[Scan]) -> Result<String, PipelineError> {
        let anchor_scan = &scans[0];
        let prefix = key_prefix(company, &anchor_scan.dataset_version_id, &anchor_scan.id);
        let key = derived_cloud_key(&prefix, schema_version, "merged", "merged.copc.laz");
        let body = serde_json::to_vec(&json!({
            "anchor_scan_id": anchor_scan.id.to_string(),
            "merged_scan_ids": scans.iter().map(|s| s.id.to_string()).collect::<Vec<_>>(),
        }))
        .unwrap_or_default();
        self.artifacts.upsert_derived_bytes(
            company,
            anchor_scan,
            schema_version,
            ArtifactKind::Derived("derived.merged_point_cloud".to_string()),
            key.clone(),
            &body,
            "application/octet-stream",
            json!({}),
        )?;
        Ok(key)
    }

    fn run_cluster(&self, company: &CompanyId, schema_version: &str, anchor_scan: &Scan, merged_key: &str) -> Result<(), PipelineError> {
        let prefix = key_prefix(company, &anchor_scan.dataset_version_id, &anchor_scan.id);
        let key = derived_cloud_key(&prefix, schema_version, "clustered", "clusters.copc.laz");
        let body = serde_json::to_vec(&json!({ "source": merged_key, "tile_count": 0, "cluster_count": 0 })).unwrap_or_default();
        self.artifacts.upsert_derived_bytes(
            company,
            anchor_scan,
            schema_version,
            ArtifactKind::Derived("derived.clustered_point_cloud".to_string()),
            key,
            &body,
            "application/octet-stream",
            json!({}),
        )?;
        Ok(())
    }
}
