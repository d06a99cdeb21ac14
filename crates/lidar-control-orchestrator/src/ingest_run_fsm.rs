// lidar-control-orchestrator/src/ingest_run_fsm.rs
// ============================================================================
// Module: Ingest Run State Machine (C11)
// Description: Fingerprint-deduplicated ingest run submission plus the
//              poll/claim/execute worker loop over queued runs.
// Purpose: Turn a scan's raw artifact set into a derived ingest manifest
//          exactly once per distinct fingerprint, with crash-safe claiming.
// Dependencies: lidar-control-core
// ============================================================================

//! ## Overview
//! [`IngestRunFsm::submit`] computes the scan's fingerprint from its raw
//! artifacts and, unless `force` is set, returns an existing terminal run for
//! that `(company, scan, schema_version, fingerprint)` tuple instead of
//! creating a new one. [`IngestRunFsm::poll_and_execute_once`] is the worker
//! loop: it lists QUEUED rows, attempts a CAS claim on each (losing the race
//! just means another worker got there first), and for every row it claims,
//! executes the ingest body and stamps SUCCEEDED or FAILED.

use std::sync::Arc;

use lidar_control_core::hashing::FingerprintArtifact;
use lidar_control_core::hashing::HashError;
use lidar_control_core::hashing::compute_fingerprint;
use lidar_control_core::ids::CompanyId;
use lidar_control_core::ids::ScanId;
use lidar_control_core::interfaces::CatalogError;
use lidar_control_core::interfaces::CatalogRepository;
use lidar_control_core::model::ArtifactKind;
use lidar_control_core::model::IngestRun;
use lidar_control_core::model::IngestRunError;
use lidar_control_core::model::IngestRunStatus;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::artifact_service::ArtifactService;
use crate::artifact_service::ArtifactServiceError;
use crate::artifact_service::derived_manifest_key;
use crate::artifact_service::key_prefix;
use crate::manifest_builder::build_ingest_manifest;

/// Errors raised while submitting or executing an ingest run.
#[derive(Debug, Error)]
pub enum IngestRunFsmError {
    /// A catalog call failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The artifact service failed while registering or putting the derived
    /// manifest.
    #[error(transparent)]
    Artifact(#[from] ArtifactServiceError),
    /// Fingerprint computation failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The scan has no raw point cloud artifact, which the manifest body
    /// requires.
    #[error("scan {0} has no raw point cloud artifact")]
    MissingPointCloud(ScanId),
}

/// Summary of one [`IngestRunFsm::poll_and_execute_once`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerPollReport {
    /// Rows this worker claimed and executed (successfully or not).
    pub attempted: u64,
    /// Rows another worker claimed first.
    pub skipped: u64,
    /// Rows where the claim succeeded but listing/stamping itself failed.
    pub errors: u64,
}

/// Drives ingest run submission and execution against a catalog and an
/// [`ArtifactService`].
pub struct IngestRunFsm {
    catalog: Arc<dyn CatalogRepository>,
    artifacts: Arc<ArtifactService>,
}

impl IngestRunFsm {
    /// Builds an FSM over the given catalog and artifact service.
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, artifacts: Arc<ArtifactService>) -> Self {
        Self { catalog, artifacts }
    }

    fn fingerprint_scan(&self, scan_id: &ScanId) -> Result<String, IngestRunFsmError> {
        let raw = self.catalog.list_raw_artifacts(scan_id)?;
        let projected: Vec<FingerprintArtifact> = raw
            .iter()
            .map(|a| FingerprintArtifact {
                kind: a.kind.as_str().to_string(),
                bucket: a.bucket.clone(),
                key: a.key.clone(),
                etag: a.etag.clone().unwrap_or_default(),
                size_bytes: a.size_bytes.unwrap_or_default(),
            })
            .collect();
        Ok(compute_fingerprint(&projected)?)
    }

    /// Submits an ingest run for `scan_id`, returning an existing terminal
    /// run for the same fingerprint unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns [`IngestRunFsmError`] on catalog or fingerprinting failure.
    pub fn submit(
        &self,
        company: &CompanyId,
        scan_id: &ScanId,
        schema_version: &str,
        force: bool,
    ) -> Result<IngestRun, IngestRunFsmError> {
        let fingerprint = self.fingerprint_scan(scan_id)?;
        if !force {
            if let Some(existing) = self.catalog.find_ingest_run(company, scan_id, schema_version, &fingerprint)? {
                info!(scan_id = %scan_id, fingerprint = %fingerprint, run_id = existing.id.value(), "reusing ingest run for unchanged fingerprint");
                return Ok(existing);
            }
        }
        let run = self.catalog.create_ingest_run(company, scan_id, schema_version, &fingerprint)?;
        Ok(run)
    }

    /// Attempts to claim `run` (CAS QUEUED -> RUNNING) and, on success,
    /// executes the ingest body and stamps the terminal status.
    ///
    /// Returns `Ok(true)` if this worker won the claim (whether the body
    /// then succeeded or failed), `Ok(false)` if another worker already
    /// claimed it.
    ///
    /// # Errors
    ///
    /// Returns [`IngestRunFsmError`] only for failures in the claim call
    /// itself or in stamping the terminal status; a failure inside the
    /// ingest body is captured as a FAILED row, not propagated.
    pub fn claim_and_execute(&self, run: &IngestRun) -> Result<bool, IngestRunFsmError> {
        if !self.catalog.claim_ingest_run(run.id)? {
            return Ok(false);
        }
        match self.execute_body(run) {
            Ok(()) => {
                self.catalog.set_ingest_run_status(run.id, IngestRunStatus::Succeeded, None)?;
                info!(run_id = run.id.value(), scan_id = %run.scan_id, "ingest run succeeded");
            }
            Err(err) => {
                warn!(run_id = run.id.value(), scan_id = %run.scan_id, error = %err, "ingest run failed");
                let error = IngestRunError {
                    error_type: "ingest_body_error".to_string(),
                    message: err.to_string(),
                    trace: None,
                };
                self.catalog.set_ingest_run_status(run.id, IngestRunStatus::Failed, Some(&error))?;
            }
        }
        Ok(true)
    }

    fn execute_body(&self, run: &IngestRun) -> Result<(), IngestRunFsmError> {
        let scan = self.catalog.get_scan(&run.scan_id)?;
        let raw_artifacts = self.catalog.list_raw_artifacts(&run.scan_id)?;
        if !raw_artifacts.iter().any(|a| a.kind == ArtifactKind::RawPointCloud) {
            return Err(IngestRunFsmError::MissingPointCloud(run.scan_id));
        }
        let crs = self.catalog.get_crs(&scan.crs_id)?;
        let manifest = build_ingest_manifest(run, &scan, &raw_artifacts, &crs);
        let body = serde_json::to_vec(&manifest).unwrap_or_else(|_| b"{}".to_vec());
        let prefix = key_prefix(&run.company_id, &scan.dataset_version_id, &scan.id);
        let key = derived_manifest_key(&prefix, &run.schema_version);
        self.artifacts.register_and_put_derived(
            &run.company_id,
            &scan,
            &run.schema_version,
            ArtifactKind::Derived("derived.ingest_manifest".to_string()),
            key,
            &body,
            "application/json",
            serde_json::json!({}),
        )?;
        Ok(())
    }

    /// Lists up to `limit` QUEUED runs (optionally filtered by schema
    /// version and company) and attempts to claim and execute each.
    ///
    /// # Errors
    ///
    /// Returns [`IngestRunFsmError`] only if listing queued runs itself
    /// fails; per-row claim/execute failures are tallied in the report.
    pub fn poll_and_execute_once(
        &self,
        schema_version: Option<&str>,
        company: Option<&CompanyId>,
        limit: i64,
    ) -> Result<WorkerPollReport, IngestRunFsmError> {
        let queued = self.catalog.list_queued_ingest_runs(schema_version, company, limit)?;
        let mut report = WorkerPollReport::default();
        for run in queued {
            match self.claim_and_execute(&run) {
                Ok(true) => report.attempted += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    warn!(run_id = run.id.value(), error = %err, "failed to claim or execute ingest run");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use std::collections::HashMap;
    use std::sync::Mutex;

    use lidar_control_core::ids::ArtifactId;
    use lidar_control_core::ids::CrsId;
    use lidar_control_core::ids::DatasetId;
    use lidar_control_core::ids::DatasetVersionId;
    use lidar_control_core::ids::IngestRunId;
    use lidar_control_core::interfaces::HeadResult;
    use lidar_control_core::interfaces::NewDerivedArtifact;
    use lidar_control_core::interfaces::NewRawArtifact;
    use lidar_control_core::interfaces::ObjectRef;
    use lidar_control_core::interfaces::ObjectStore;
    use lidar_control_core::interfaces::ObjectStoreError;
    use lidar_control_core::interfaces::PutResult;
    use lidar_control_core::model::Artifact;
    use lidar_control_core::model::ArtifactStatus;
    use lidar_control_core::model::Company;
    use lidar_control_core::model::Crs;
    use lidar_control_core::model::Dataset;
    use lidar_control_core::model::DatasetVersion;
    use lidar_control_core::model::Pose;
    use lidar_control_core::model::Scan;
    use lidar_control_core::model::ScanEdge;
    use lidar_control_core::model::ScanStatus;

    use super::*;

    struct NullObjectStore;

    impl ObjectStore for NullObjectStore {
        fn put_object(&self, _object: &ObjectRef, _local_path: &std::path::Path) -> Result<PutResult, ObjectStoreError> {
            Ok(PutResult { etag: "etag".to_string(), size_bytes: 0 })
        }
        fn put_bytes(&self, _object: &ObjectRef, body: &[u8], _content_type: &str) -> Result<PutResult, ObjectStoreError> {
            Ok(PutResult { etag: format!("etag-{}", body.len()), size_bytes: body.len() as i64 })
        }
        fn upload_file(&self, object: &ObjectRef, local_path: &std::path::Path) -> Result<PutResult, ObjectStoreError> {
            self.put_object(object, local_path)
        }
        fn get_bytes(&self, _object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError> {
            Ok(Vec::new())
        }
        fn download_file(&self, _object: &ObjectRef, _local_path: &std::path::Path) -> Result<(), ObjectStoreError> {
            Ok(())
        }
        fn head_object(&self, _object: &ObjectRef) -> Result<HeadResult, ObjectStoreError> {
            Ok(HeadResult::default())
        }
    }

    struct FakeCatalog {
        scans: Mutex<HashMap<ScanId, Scan>>,
        crs: Mutex<HashMap<CrsId, Crs>>,
        raw_artifacts: Mutex<Vec<Artifact>>,
        runs: Mutex<HashMap<i64, IngestRun>>,
        next_run_id: Mutex<i64>,
        next_artifact_id: Mutex<i64>,
    }

    impl FakeCatalog {
        fn new() -> Self {
            Self {
                scans: Mutex::new(HashMap::new()),
                crs: Mutex::new(HashMap::new()),
                raw_artifacts: Mutex::new(Vec::new()),
                runs: Mutex::new(HashMap::new()),
                next_run_id: Mutex::new(1),
                next_artifact_id: Mutex::new(1),
            }
        }

        fn alloc_run_id(&self) -> IngestRunId {
            let mut guard = self.next_run_id.lock().expect("lock");
            let id = *guard;
            *guard += 1;
            IngestRunId::new(id)
        }
    }

    impl CatalogRepository for FakeCatalog {
        fn ensure_company(&self, id: &CompanyId, name: &str) -> Result<Company, CatalogError> {
            Ok(Company { id: id.clone(), name: name.to_string() })
        }
        fn ensure_crs(&self, crs: &Crs) -> Result<Crs, CatalogError> {
            self.crs.lock().expect("lock").insert(crs.id.clone(), crs.clone());
            Ok(crs.clone())
        }
        fn get_crs(&self, id: &CrsId) -> Result<Crs, CatalogError> {
            self.crs.lock().expect("lock").get(id).cloned().ok_or_else(|| CatalogError::NotFound(id.to_string()))
        }
        fn ensure_dataset(&self, company: &CompanyId, name: &str, crs_id: Option<&CrsId>) -> Result<Dataset, CatalogError> {
            Ok(Dataset {
                id: DatasetId::generate(),
                company_id: company.clone(),
                name: name.to_string(),
                crs_id: crs_id.cloned().unwrap_or_else(|| CrsId::new("crs")),
            })
        }
        fn get_dataset(&self, _id: &DatasetId) -> Result<Dataset, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn ensure_dataset_version(&self, dataset_id: &DatasetId) -> Result<DatasetVersion, CatalogError> {
            Ok(DatasetVersion { id: DatasetVersionId::generate(), dataset_id: dataset_id.clone(), version: 1, is_active: true, created_at: 0 })
        }
        fn get_dataset_version(&self, _id: &DatasetVersionId) -> Result<DatasetVersion, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn bump_dataset_version(&self, dataset_id: &DatasetId) -> Result<DatasetVersion, CatalogError> {
            Ok(DatasetVersion { id: DatasetVersionId::generate(), dataset_id: dataset_id.clone(), version: 2, is_active: true, created_at: 0 })
        }
        fn create_scan(&self, _company: &CompanyId, _dataset_version_id: &DatasetVersionId, _crs_id: &CrsId) -> Result<Scan, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn get_scan(&self, id: &ScanId) -> Result<Scan, CatalogError> {
            self.scans.lock().expect("lock").get(id).cloned().ok_or_else(|| CatalogError::NotFound(id.to_string()))
        }
        fn list_scans_for_version(&self, _dataset_version_id: &DatasetVersionId) -> Result<Vec<Scan>, CatalogError> {
            Ok(Vec::new())
        }
        fn set_scan_status(&self, _id: &ScanId, _status: ScanStatus) -> Result<(), CatalogError> {
            Ok(())
        }
        fn register_raw_artifact(&self, _company: &CompanyId, _scan_id: &ScanId, _artifact: &NewRawArtifact) -> Result<Artifact, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn register_artifact(&self, company: &CompanyId, scan_id: &ScanId, artifact: &NewDerivedArtifact) -> Result<Artifact, CatalogError> {
            let mut guard = self.next_artifact_id.lock().expect("lock");
            let id = *guard;
            *guard += 1;
            let row = Artifact {
                id: ArtifactId::new(id),
                company_id: company.clone(),
                scan_id: *scan_id,
                kind: artifact.kind.clone(),
                schema_version: Some(artifact.schema_version.clone()),
                bucket: artifact.bucket.clone(),
                key: artifact.key.clone(),
                etag: artifact.etag.clone(),
                size_bytes: artifact.size_bytes,
                status: artifact.status,
                meta: artifact.meta.clone(),
                created_at: 0,
            };
            Ok(row)
        }
        fn upsert_derived_artifact(&self, company: &CompanyId, scan_id: &ScanId, artifact: &NewDerivedArtifact) -> Result<Artifact, CatalogError> {
            self.register_artifact(company, scan_id, artifact)
        }
        fn list_raw_artifacts(&self, scan_id: &ScanId) -> Result<Vec<Artifact>, CatalogError> {
            Ok(self.raw_artifacts.lock().expect("lock").iter().filter(|a| &a.scan_id == scan_id).cloned().collect())
        }
        fn find_derived_artifact(&self, _scan_id: &ScanId, _kind: &ArtifactKind, _schema_version: &str) -> Result<Artifact, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn list_artifacts_by_status(&self, _status: ArtifactStatus, _limit: i64) -> Result<Vec<Artifact>, CatalogError> {
            Ok(Vec::new())
        }
        fn set_artifact_status(&self, _id: ArtifactId, _status: ArtifactStatus, _etag: Option<&str>, _size_bytes: Option<i64>) -> Result<(), CatalogError> {
            Ok(())
        }
        fn find_ingest_run(&self, _company: &CompanyId, scan_id: &ScanId, schema_version: &str, fingerprint: &str) -> Result<Option<IngestRun>, CatalogError> {
            Ok(self
                .runs
                .lock()
                .expect("lock")
                .values()
                .find(|r| {
                    &r.scan_id == scan_id
                        && r.schema_version == schema_version
                        && r.input_fingerprint == fingerprint
                        && matches!(r.status, IngestRunStatus::Succeeded | IngestRunStatus::Failed)
                })
                .cloned())
        }
        fn create_ingest_run(&self, company: &CompanyId, scan_id: &ScanId, schema_version: &str, fingerprint: &str) -> Result<IngestRun, CatalogError> {
            let id = self.alloc_run_id();
            let run = IngestRun {
                id,
                company_id: company.clone(),
                scan_id: *scan_id,
                schema_version: schema_version.to_string(),
                input_fingerprint: fingerprint.to_string(),
                status: IngestRunStatus::Queued,
                error: None,
                created_at: 0,
                finished_at: None,
            };
            self.runs.lock().expect("lock").insert(id.value(), run.clone());
            Ok(run)
        }
        fn set_ingest_run_status(&self, id: IngestRunId, status: IngestRunStatus, error: Option<&IngestRunError>) -> Result<(), CatalogError> {
            let mut guard = self.runs.lock().expect("lock");
            if let Some(run) = guard.get_mut(&id.value()) {
                run.status = status;
                run.error = error.cloned();
                run.finished_at = Some(0);
            }
            Ok(())
        }
        fn claim_ingest_run(&self, id: IngestRunId) -> Result<bool, CatalogError> {
            let mut guard = self.runs.lock().expect("lock");
            match guard.get_mut(&id.value()) {
                Some(run) if run.status == IngestRunStatus::Queued => {
                    run.status = IngestRunStatus::Running;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        fn list_queued_ingest_runs(&self, _schema_version: Option<&str>, _company: Option<&CompanyId>, limit: i64) -> Result<Vec<IngestRun>, CatalogError> {
            Ok(self
                .runs
                .lock()
                .expect("lock")
                .values()
                .filter(|r| r.status == IngestRunStatus::Queued)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
        fn add_scan_edges(&self, _edges: &[ScanEdge]) -> Result<(), CatalogError> {
            Ok(())
        }
        fn upsert_scan_pose(&self, _company: &CompanyId, _dataset_version_id: &DatasetVersionId, _scan_id: &ScanId, _pose: &Pose, _quality: f64, _meta: serde_json::Value) -> Result<(), CatalogError> {
            Ok(())
        }
        fn resolve_crs_to_pdal_srs(&self, crs_id: &CrsId) -> Result<String, CatalogError> {
            Ok(crs_id.to_string())
        }
    }

    fn sample_setup() -> (Arc<FakeCatalog>, Scan, CompanyId) {
        let catalog = Arc::new(FakeCatalog::new());
        let company = CompanyId::new("co-1");
        let crs = Crs {
            id: CrsId::new("crs-1"),
            name: "WGS84".to_string(),
            zone_degree: None,
            epsg: Some(4326),
            units: "degree".to_string(),
            axis_order: "enu".to_string(),
            meta: serde_json::json!({}),
        };
        catalog.ensure_crs(&crs).expect("ensure crs");
        let scan = Scan {
            id: ScanId::generate(),
            company_id: company.clone(),
            dataset_id: DatasetId::generate(),
            dataset_version_id: DatasetVersionId::generate(),
            crs_id: crs.id.clone(),
            status: ScanStatus::Created,
            schema_version: None,
            owner_department: None,
            meta: serde_json::json!({}),
        };
        catalog.scans.lock().expect("lock").insert(scan.id, scan.clone());
        catalog.raw_artifacts.lock().expect("lock").push(Artifact {
            id: ArtifactId::new(1),
            company_id: company.clone(),
            scan_id: scan.id,
            kind: ArtifactKind::RawPointCloud,
            schema_version: None,
            bucket: "bucket".to_string(),
            key: "tenants/co-1/cloud.laz".to_string(),
            etag: Some("etag".to_string()),
            size_bytes: Some(100),
            status: ArtifactStatus::Available,
            meta: serde_json::json!({}),
            created_at: 0,
        });
        (catalog, scan, company)
    }

    #[test]
    fn submit_without_force_reuses_terminal_run_for_unchanged_fingerprint() {
        let (catalog, scan, company) = sample_setup();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        let first = fsm.submit(&company, &scan.id, "1", false).expect("submit");
        fsm.claim_and_execute(&first).expect("execute");

        let second = fsm.submit(&company, &scan.id, "1", false).expect("submit again");
        assert_eq!(second.id, first.id);
        assert_eq!(catalog.runs.lock().expect("lock").len(), 1);
    }

    #[test]
    fn submit_with_force_creates_a_new_run() {
        let (catalog, scan, company) = sample_setup();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        let first = fsm.submit(&company, &scan.id, "1", false).expect("submit");
        fsm.claim_and_execute(&first).expect("execute");
        let second = fsm.submit(&company, &scan.id, "1", true).expect("submit forced");
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn claim_and_execute_marks_run_succeeded() {
        let (catalog, scan, company) = sample_setup();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        let run = fsm.submit(&company, &scan.id, "1", false).expect("submit");
        let claimed = fsm.claim_and_execute(&run).expect("execute");
        assert!(claimed);
        let stored = catalog.runs.lock().expect("lock").get(&run.id.value()).cloned().expect("run");
        assert_eq!(stored.status, IngestRunStatus::Succeeded);
    }

    #[test]
    fn claim_and_execute_skips_already_claimed_run() {
        let (catalog, scan, company) = sample_setup();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        let run = fsm.submit(&company, &scan.id, "1", false).expect("submit");
        catalog.claim_ingest_run(run.id).expect("pre-claim");
        let claimed = fsm.claim_and_execute(&run).expect("execute");
        assert!(!claimed);
    }

    #[test]
    fn execute_body_fails_without_raw_point_cloud() {
        let (catalog, scan, company) = sample_setup();
        catalog.raw_artifacts.lock().expect("lock").clear();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        let run = fsm.submit(&company, &scan.id, "1", false).expect("submit");
        fsm.claim_and_execute(&run).expect("execute");
        let stored = catalog.runs.lock().expect("lock").get(&run.id.value()).cloned().expect("run");
        assert_eq!(stored.status, IngestRunStatus::Failed);
        assert!(stored.error.is_some());
    }

    #[test]
    fn poll_and_execute_once_executes_queued_runs() {
        let (catalog, scan, company) = sample_setup();
        let artifacts = Arc::new(ArtifactService::new(Arc::new(NullObjectStore), catalog.clone(), "bucket"));
        let fsm = IngestRunFsm::new(catalog.clone(), artifacts);

        fsm.submit(&company, &scan.id, "1", false).expect("submit");

        let report = fsm.poll_and_execute_once(None, None, 10).expect("poll");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped, 0);
    }
}
