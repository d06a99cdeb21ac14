// lidar-control-orchestrator/src/artifact_service.rs
// ============================================================================
// Module: Artifact Service (C4)
// Description: Composes the ObjectStore and CatalogRepository into the
//              deterministic key layout, raw/derived upload flows, and the
//              PENDING->AVAILABLE reconciler.
// Purpose: Give every upload path in the system (raw ingest, derived
//          manifest, derived point clouds) one place that picks the key,
//          puts the bytes, and registers the catalog row.
// Dependencies: lidar-control-core
// ============================================================================

//! ## Overview
//! Keys are deterministic and UTF-8 normalized: any character outside
//! `[A-Za-z0-9._-]` in a user-supplied filename segment is replaced with
//! `_`. The *two-phase register* used by the manifest builder — insert
//! PENDING, put the object, upsert AVAILABLE with etag/size — is
//! [`ArtifactService::register_and_put_derived`]; [`ArtifactService::reconcile_pending`]
//! is the background healer that later closes the gap for any PENDING row
//! whose second phase never ran (process crash between insert and put).

use std::path::Path;
use std::sync::Arc;

use lidar_control_core::ids::CompanyId;
use lidar_control_core::ids::DatasetVersionId;
use lidar_control_core::ids::ScanId;
use lidar_control_core::interfaces::CatalogError;
use lidar_control_core::interfaces::CatalogRepository;
use lidar_control_core::interfaces::NewDerivedArtifact;
use lidar_control_core::interfaces::NewRawArtifact;
use lidar_control_core::interfaces::ObjectRef;
use lidar_control_core::interfaces::ObjectStore;
use lidar_control_core::interfaces::ObjectStoreError;
use lidar_control_core::model::Artifact;
use lidar_control_core::model::ArtifactKind;
use lidar_control_core::model::ArtifactStatus;
use lidar_control_core::model::Scan;
use thiserror::Error;

/// Errors raised while composing object store puts with catalog writes.
#[derive(Debug, Error)]
pub enum ArtifactServiceError {
    /// The scan does not belong to the company authorizing the call.
    #[error("scan {scan_id} does not belong to company {company}")]
    Unauthorized {
        /// The scan id that failed authorization.
        scan_id: ScanId,
        /// The company id the caller authorized as.
        company: CompanyId,
    },
    /// The operation was called with a kind it does not accept.
    #[error("invalid artifact kind for this operation: {0}")]
    InvalidKind(String),
    /// A filename could not be determined from the local path or the
    /// caller-supplied override.
    #[error("no filename available for upload")]
    MissingFilename,
    /// The object store call failed.
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
    /// The catalog call failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Builds the `tenants/<co>/dataset_versions/<dv>/scans/<scan>` key prefix.
#[must_use]
pub fn key_prefix(company: &CompanyId, dataset_version_id: &DatasetVersionId, scan_id: &ScanId) -> String {
    format!(
        "tenants/{}/dataset_versions/{}/scans/{}",
        sanitize_segment(company.as_str()),
        dataset_version_id,
        scan_id
    )
}

/// Builds the key for a raw artifact of `kind` under `prefix`.
///
/// # Errors
///
/// Returns [`ArtifactServiceError::InvalidKind`] when `kind` is not one of
/// the three raw kinds.
pub fn raw_artifact_key(prefix: &str, kind: &ArtifactKind, filename: &str) -> Result<String, ArtifactServiceError> {
    match kind {
        ArtifactKind::RawPointCloud => Ok(format!("{prefix}/raw/point_cloud/{}", sanitize_segment(filename))),
        ArtifactKind::RawTrajectory => Ok(format!("{prefix}/raw/trajectory/path.txt")),
        ArtifactKind::RawControlPoint => Ok(format!("{prefix}/raw/control_points/ControlPoint.txt")),
        ArtifactKind::Derived(other) => Err(ArtifactServiceError::InvalidKind(other.clone())),
    }
}

/// Builds the key for the derived ingest manifest under `prefix`.
#[must_use]
pub fn derived_manifest_key(prefix: &str, schema_version: &str) -> String {
    format!("{prefix}/derived/v{schema_version}/ingest_manifest.json")
}

/// Builds the key for a derived point cloud at pipeline `stage`.
#[must_use]
pub fn derived_cloud_key(prefix: &str, schema_version: &str, stage: &str, filename: &str) -> String {
    format!("{prefix}/derived/v{schema_version}/{stage}/point_cloud/{}", sanitize_segment(filename))
}

/// Outcome of one [`ArtifactService::reconcile_pending`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Rows transitioned PENDING -> AVAILABLE.
    pub healed: u64,
    /// Rows transitioned PENDING -> FAILED.
    pub failed: u64,
}

/// Composes an [`ObjectStore`] and a [`CatalogRepository`] into the
/// deterministic-key upload/reconcile flows of the artifact service.
pub struct ArtifactService {
    object_store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogRepository>,
    bucket: String,
}

impl ArtifactService {
    /// Builds a service against the given adapters and default bucket.
    #[must_use]
    pub fn new(object_store: Arc<dyn ObjectStore>, catalog: Arc<dyn CatalogRepository>, bucket: impl Into<String>) -> Self {
        Self { object_store, catalog, bucket: bucket.into() }
    }

    fn authorize(&self, company: &CompanyId, scan: &Scan) -> Result<(), ArtifactServiceError> {
        if &scan.company_id != company {
            return Err(ArtifactServiceError::Unauthorized { scan_id: scan.id, company: company.clone() });
        }
        Ok(())
    }

    /// Uploads a raw artifact file, registering it AVAILABLE in one call.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] on authorization, object store, or
    /// catalog failure (including a duplicate raw kind for this scan).
    pub fn upload_raw_artifact(
        &self,
        company: &CompanyId,
        scan: &Scan,
        kind: ArtifactKind,
        local_path: &Path,
        filename_override: Option<&str>,
        meta: serde_json::Value,
    ) -> Result<Artifact, ArtifactServiceError> {
        self.authorize(company, scan)?;
        if !kind.is_raw() {
            return Err(ArtifactServiceError::InvalidKind(kind.as_str().to_string()));
        }
        let filename = filename_override
            .map(ToString::to_string)
            .or_else(|| local_path.file_name().and_then(|s| s.to_str()).map(ToString::to_string))
            .ok_or(ArtifactServiceError::MissingFilename)?;
        let prefix = key_prefix(company, &scan.dataset_version_id, &scan.id);
        let key = raw_artifact_key(&prefix, &kind, &filename)?;
        let object = ObjectRef::new(self.bucket.clone(), key.clone());
        let put = self.object_store.upload_file(&object, local_path)?;
        let artifact = self.catalog.register_raw_artifact(
            company,
            &scan.id,
            &NewRawArtifact { kind, bucket: self.bucket.clone(), key, etag: put.etag, size_bytes: put.size_bytes, meta },
        )?;
        Ok(artifact)
    }

    /// Puts `body` and registers (non-upserting) a derived artifact row.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] on authorization, object store, or
    /// catalog failure.
    pub fn upload_derived_bytes(
        &self,
        company: &CompanyId,
        scan: &Scan,
        schema_version: &str,
        kind: ArtifactKind,
        key: String,
        body: &[u8],
        content_type: &str,
        meta: serde_json::Value,
    ) -> Result<Artifact, ArtifactServiceError> {
        self.authorize(company, scan)?;
        let object = ObjectRef::new(self.bucket.clone(), key.clone());
        let put = self.object_store.put_bytes(&object, body, content_type)?;
        let artifact = self.catalog.register_artifact(
            company,
            &scan.id,
            &NewDerivedArtifact {
                kind,
                schema_version: schema_version.to_string(),
                bucket: self.bucket.clone(),
                key,
                etag: Some(put.etag),
                size_bytes: Some(put.size_bytes),
                status: ArtifactStatus::Available,
                meta,
            },
        )?;
        Ok(artifact)
    }

    /// Puts `body` and upserts a derived artifact row keyed by
    /// `(scan, kind, schema_version)`; idempotent on repeated calls with the
    /// same inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] on authorization, object store, or
    /// catalog failure.
    pub fn upsert_derived_bytes(
        &self,
        company: &CompanyId,
        scan: &Scan,
        schema_version: &str,
        kind: ArtifactKind,
        key: String,
        body: &[u8],
        content_type: &str,
        meta: serde_json::Value,
    ) -> Result<Artifact, ArtifactServiceError> {
        self.authorize(company, scan)?;
        let object = ObjectRef::new(self.bucket.clone(), key.clone());
        let put = self.object_store.put_bytes(&object, body, content_type)?;
        let artifact = self.catalog.upsert_derived_artifact(
            company,
            &scan.id,
            &NewDerivedArtifact {
                kind,
                schema_version: schema_version.to_string(),
                bucket: self.bucket.clone(),
                key,
                etag: Some(put.etag),
                size_bytes: Some(put.size_bytes),
                status: ArtifactStatus::Available,
                meta,
            },
        )?;
        Ok(artifact)
    }

    /// Uploads a derived artifact from a local file, upserting the catalog
    /// row keyed by `(scan, kind, schema_version)`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] on authorization, object store, or
    /// catalog failure.
    pub fn upsert_derived_file(
        &self,
        company: &CompanyId,
        scan: &Scan,
        schema_version: &str,
        kind: ArtifactKind,
        key: String,
        local_path: &Path,
        meta: serde_json::Value,
    ) -> Result<Artifact, ArtifactServiceError> {
        self.authorize(company, scan)?;
        let object = ObjectRef::new(self.bucket.clone(), key.clone());
        let put = self.object_store.upload_file(&object, local_path)?;
        let artifact = self.catalog.upsert_derived_artifact(
            company,
            &scan.id,
            &NewDerivedArtifact {
                kind,
                schema_version: schema_version.to_string(),
                bucket: self.bucket.clone(),
                key,
                etag: Some(put.etag),
                size_bytes: Some(put.size_bytes),
                status: ArtifactStatus::Available,
                meta,
            },
        )?;
        Ok(artifact)
    }

    /// The two-phase register used by the ingest manifest step: (a) insert
    /// PENDING with no etag/size, (b) put the object, (c) upsert AVAILABLE
    /// with etag/size filled in.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] if any phase fails. A failure
    /// between (a) and (c) leaves a PENDING row for
    /// [`ArtifactService::reconcile_pending`] to heal later.
    pub fn register_and_put_derived(
        &self,
        company: &CompanyId,
        scan: &Scan,
        schema_version: &str,
        kind: ArtifactKind,
        key: String,
        body: &[u8],
        content_type: &str,
        meta: serde_json::Value,
    ) -> Result<Artifact, ArtifactServiceError> {
        self.authorize(company, scan)?;
        self.catalog.register_artifact(
            company,
            &scan.id,
            &NewDerivedArtifact {
                kind: kind.clone(),
                schema_version: schema_version.to_string(),
                bucket: self.bucket.clone(),
                key: key.clone(),
                etag: None,
                size_bytes: None,
                status: ArtifactStatus::Pending,
                meta: meta.clone(),
            },
        )?;
        let object = ObjectRef::new(self.bucket.clone(), key.clone());
        let put = self.object_store.put_bytes(&object, body, content_type)?;
        let artifact = self.catalog.upsert_derived_artifact(
            company,
            &scan.id,
            &NewDerivedArtifact {
                kind,
                schema_version: schema_version.to_string(),
                bucket: self.bucket.clone(),
                key,
                etag: Some(put.etag),
                size_bytes: Some(put.size_bytes),
                status: ArtifactStatus::Available,
                meta,
            },
        )?;
        Ok(artifact)
    }

    /// Probes every PENDING artifact (up to `limit`) against the object
    /// store, healing PENDING -> AVAILABLE on presence or PENDING -> FAILED
    /// on absence.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactServiceError`] on object store or catalog failure.
    pub fn reconcile_pending(&self, limit: i64) -> Result<ReconcileReport, ArtifactServiceError> {
        let pending = self.catalog.list_artifacts_by_status(ArtifactStatus::Pending, limit)?;
        let mut report = ReconcileReport::default();
        for artifact in pending {
            let object = ObjectRef::new(artifact.bucket.clone(), artifact.key.clone());
            let head = self.object_store.head_object(&object)?;
            if head.exists() {
                self.catalog.set_artifact_status(artifact.id, ArtifactStatus::Available, head.etag.as_deref(), head.size_bytes)?;
                report.healed += 1;
            } else {
                self.catalog.set_artifact_status(artifact.id, ArtifactStatus::Failed, None, None)?;
                report.failed += 1;
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
    use lidar_control_core::ids::DatasetId;
    use lidar_control_core::ids::IngestRunId;
    use lidar_control_core::model::Company;
    use lidar_control_core::model::Crs;
    use lidar_control_core::model::Dataset;
    use lidar_control_core::model::DatasetVersion;
    use lidar_control_core::model::IngestRun;
    use lidar_control_core::model::IngestRunError;
    use lidar_control_core::model::IngestRunStatus;
    use lidar_control_core::model::Pose;
    use lidar_control_core::model::ScanEdge;
    use lidar_control_core::model::ScanStatus;

    use super::*;

    #[test]
    fn sanitize_segment_replaces_unsafe_characters() {
        assert_eq!(sanitize_segment("scan 01/ä€.las"), "scan_01_____las");
    }

    #[test]
    fn raw_artifact_key_rejects_derived_kind() {
        let prefix = "tenants/co/dataset_versions/dv/scans/sc";
        let err = raw_artifact_key(prefix, &ArtifactKind::Derived("derived.ingest_manifest".to_string()), "x").unwrap_err();
        assert!(matches!(err, ArtifactServiceError::InvalidKind(_)));
    }

    #[test]
    fn trajectory_and_control_point_keys_are_fixed_filenames() {
        let prefix = "tenants/co/dataset_versions/dv/scans/sc";
        assert_eq!(
            raw_artifact_key(prefix, &ArtifactKind::RawTrajectory, "whatever.txt").expect("key"),
            "tenants/co/dataset_versions/dv/scans/sc/raw/trajectory/path.txt"
        );
        assert_eq!(
            raw_artifact_key(prefix, &ArtifactKind::RawControlPoint, "whatever.txt").expect("key"),
            "tenants/co/dataset_versions/dv/scans/sc/raw/control_points/ControlPoint.txt"
        );
    }

    #[test]
    fn derived_manifest_and_cloud_keys_match_layout() {
        let prefix = "tenants/co/dataset_versions/dv/scans/sc";
        assert_eq!(derived_manifest_key(prefix, "1"), "tenants/co/dataset_versions/dv/scans/sc/derived/v1/ingest_manifest.json");
        assert_eq!(
            derived_cloud_key(prefix, "1", "reprojected", "cloud.laz"),
            "tenants/co/dataset_versions/dv/scans/sc/derived/v1/reprojected/point_cloud/cloud.laz"
        );
    }

    struct InMemoryObjectStore {
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    impl InMemoryObjectStore {
        fn new() -> Self {
            Self { objects: Mutex::new(HashMap::new()) }
        }
    }

    impl ObjectStore for InMemoryObjectStore {
        fn put_object(&self, object: &ObjectRef, local_path: &Path) -> Result<lidar_control_core::interfaces::PutResult, ObjectStoreError> {
            let bytes = std::fs::read(local_path).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            self.put_bytes(object, &bytes, "application/octet-stream")
        }

        fn put_bytes(&self, object: &ObjectRef, body: &[u8], _content_type: &str) -> Result<lidar_control_core::interfaces::PutResult, ObjectStoreError> {
            let mut guard = self.objects.lock().expect("lock");
            guard.insert((object.bucket.clone(), object.key.clone()), body.to_vec());
            Ok(lidar_control_core::interfaces::PutResult { etag: format!("etag-{}", body.len()), size_bytes: body.len() as i64 })
        }

        fn upload_file(&self, object: &ObjectRef, local_path: &Path) -> Result<lidar_control_core::interfaces::PutResult, ObjectStoreError> {
            self.put_object(object, local_path)
        }

        fn get_bytes(&self, object: &ObjectRef) -> Result<Vec<u8>, ObjectStoreError> {
            let guard = self.objects.lock().expect("lock");
            guard
                .get(&(object.bucket.clone(), object.key.clone()))
                .cloned()
                .ok_or_else(|| ObjectStoreError::Fatal("not found".to_string()))
        }

        fn download_file(&self, object: &ObjectRef, local_path: &Path) -> Result<(), ObjectStoreError> {
            let bytes = self.get_bytes(object)?;
            std::fs::write(local_path, bytes).map_err(|err| ObjectStoreError::Io(err.to_string()))
        }

        fn head_object(&self, object: &ObjectRef) -> Result<lidar_control_core::interfaces::HeadResult, ObjectStoreError> {
            let guard = self.objects.lock().expect("lock");
            match guard.get(&(object.bucket.clone(), object.key.clone())) {
                Some(bytes) => Ok(lidar_control_core::interfaces::HeadResult {
                    etag: Some(format!("etag-{}", bytes.len())),
                    size_bytes: Some(bytes.len() as i64),
                }),
                None => Ok(lidar_control_core::interfaces::HeadResult::default()),
            }
        }
    }

    struct FakeCatalog {
        next_id: Mutex<i64>,
        raw_artifacts: Mutex<Vec<Artifact>>,
        derived_artifacts: Mutex<HashMap<(ScanId, String, String), Artifact>>,
        pending: Mutex<Vec<Artifact>>,
    }

    impl FakeCatalog {
        fn new() -> Self {
            Self {
                next_id: Mutex::new(1),
                raw_artifacts: Mutex::new(Vec::new()),
                derived_artifacts: Mutex::new(HashMap::new()),
                pending: Mutex::new(Vec::new()),
            }
        }

        fn alloc_id(&self) -> ArtifactId {
            let mut guard = self.next_id.lock().expect("lock");
            let id = *guard;
            *guard += 1;
            ArtifactId::new(id)
        }
    }

    impl CatalogRepository for FakeCatalog {
        fn ensure_company(&self, id: &CompanyId, name: &str) -> Result<Company, CatalogError> {
            Ok(Company { id: id.clone(), name: name.to_string() })
        }
        fn ensure_crs(&self, crs: &Crs) -> Result<Crs, CatalogError> {
            Ok(crs.clone())
        }
        fn get_crs(&self, id: &lidar_control_core::ids::CrsId) -> Result<Crs, CatalogError> {
            Err(CatalogError::NotFound(id.to_string()))
        }
        fn ensure_dataset(&self, company: &CompanyId, name: &str, crs_id: Option<&lidar_control_core::ids::CrsId>) -> Result<Dataset, CatalogError> {
            Ok(Dataset {
                id: DatasetId::generate(),
                company_id: company.clone(),
                name: name.to_string(),
                crs_id: crs_id.cloned().unwrap_or_else(|| lidar_control_core::ids::CrsId::new("crs")),
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
        fn create_scan(&self, _company: &CompanyId, _dataset_version_id: &DatasetVersionId, _crs_id: &lidar_control_core::ids::CrsId) -> Result<Scan, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn get_scan(&self, _id: &ScanId) -> Result<Scan, CatalogError> {
            unimplemented!("not exercised by this test")
        }
        fn list_scans_for_version(&self, _dataset_version_id: &DatasetVersionId) -> Result<Vec<Scan>, CatalogError> {
            Ok(Vec::new())
        }
        fn set_scan_status(&self, _id: &ScanId, _status: ScanStatus) -> Result<(), CatalogError> {
            Ok(())
        }
        fn register_raw_artifact(&self, company: &CompanyId, scan_id: &ScanId, artifact: &NewRawArtifact) -> Result<Artifact, CatalogError> {
            let mut guard = self.raw_artifacts.lock().expect("lock");
            if guard.iter().any(|a| &a.scan_id == scan_id && a.kind == artifact.kind) {
                return Err(CatalogError::Invariant("duplicate raw kind".to_string()));
            }
            let row = Artifact {
                id: self.alloc_id(),
                company_id: company.clone(),
                scan_id: *scan_id,
                kind: artifact.kind.clone(),
                schema_version: None,
                bucket: artifact.bucket.clone(),
                key: artifact.key.clone(),
                etag: Some(artifact.etag.clone()),
                size_bytes: Some(artifact.size_bytes),
                status: ArtifactStatus::Available,
                meta: artifact.meta.clone(),
                created_at: 0,
            };
            guard.push(row.clone());
            Ok(row)
        }
        fn register_artifact(&self, company: &CompanyId, scan_id: &ScanId, artifact: &NewDerivedArtifact) -> Result<Artifact, CatalogError> {
            let row = Artifact {
                id: self.alloc_id(),
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
            if row.status == ArtifactStatus::Pending {
                self.pending.lock().expect("lock").push(row.clone());
            }
            self.derived_artifacts
                .lock()
                .expect("lock")
                .insert((*scan_id, artifact.kind.as_str().to_string(), artifact.schema_version.clone()), row.clone());
            Ok(row)
        }
        fn upsert_derived_artifact(&self, company: &CompanyId, scan_id: &ScanId, artifact: &NewDerivedArtifact) -> Result<Artifact, CatalogError> {
            let row = Artifact {
                id: self.alloc_id(),
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
            let mut pending = self.pending.lock().expect("lock");
            pending.retain(|p| !(p.scan_id == *scan_id && p.kind == artifact.kind));
            self.derived_artifacts
                .lock()
                .expect("lock")
                .insert((*scan_id, artifact.kind.as_str().to_string(), artifact.schema_version.clone()), row.clone());
            Ok(row)
        }
        fn list_raw_artifacts(&self, scan_id: &ScanId) -> Result<Vec<Artifact>, CatalogError> {
            Ok(self.raw_artifacts.lock().expect("lock").iter().filter(|a| &a.scan_id == scan_id).cloned().collect())
        }
        fn find_derived_artifact(&self, scan_id: &ScanId, kind: &ArtifactKind, schema_version: &str) -> Result<Artifact, CatalogError> {
            self.derived_artifacts
                .lock()
                .expect("lock")
                .get(&(*scan_id, kind.as_str().to_string(), schema_version.to_string()))
                .cloned()
                .ok_or_else(|| CatalogError::NotFound("derived artifact".to_string()))
        }
        fn list_artifacts_by_status(&self, status: ArtifactStatus, limit: i64) -> Result<Vec<Artifact>, CatalogError> {
            Ok(self
                .pending
                .lock()
                .expect("lock")
                .iter()
                .filter(|a| a.status == status)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
        fn set_artifact_status(&self, id: ArtifactId, status: ArtifactStatus, etag: Option<&str>, size_bytes: Option<i64>) -> Result<(), CatalogError> {
            let mut pending = self.pending.lock().expect("lock");
            pending.retain(|a| a.id != id);
            let mut derived = self.derived_artifacts.lock().expect("lock");
            for row in derived.values_mut() {
                if row.id == id {
                    row.status = status;
                    row.etag = etag.map(ToString::to_string).or(row.etag.clone());
                    row.size_bytes = size_bytes.or(row.size_bytes);
                }
            }
            Ok(())
        }
        fn find_ingest_run(&self, _company: &CompanyId, _scan_id: &ScanId, _schema_version: &str, _fingerprint: &str) -> Result<Option<IngestRun>, CatalogError> {
            Ok(None)
        }
        fn create_ingest_run(&self, company: &CompanyId, scan_id: &ScanId, schema_version: &str, fingerprint: &str) -> Result<IngestRun, CatalogError> {
            Ok(IngestRun {
                id: IngestRunId::new(1),
                company_id: company.clone(),
                scan_id: *scan_id,
                schema_version: schema_version.to_string(),
                input_fingerprint: fingerprint.to_string(),
                status: IngestRunStatus::Queued,
                error: None,
                created_at: 0,
                finished_at: None,
            })
        }
        fn set_ingest_run_status(&self, _id: IngestRunId, _status: IngestRunStatus, _error: Option<&IngestRunError>) -> Result<(), CatalogError> {
            Ok(())
        }
        fn claim_ingest_run(&self, _id: IngestRunId) -> Result<bool, CatalogError> {
            Ok(true)
        }
        fn list_queued_ingest_runs(&self, _schema_version: Option<&str>, _company: Option<&CompanyId>, _limit: i64) -> Result<Vec<IngestRun>, CatalogError> {
            Ok(Vec::new())
        }
        fn add_scan_edges(&self, _edges: &[ScanEdge]) -> Result<(), CatalogError> {
            Ok(())
        }
        fn upsert_scan_pose(&self, _company: &CompanyId, _dataset_version_id: &DatasetVersionId, _scan_id: &ScanId, _pose: &Pose, _quality: f64, _meta: serde_json::Value) -> Result<(), CatalogError> {
            Ok(())
        }
        fn resolve_crs_to_pdal_srs(&self, crs_id: &lidar_control_core::ids::CrsId) -> Result<String, CatalogError> {
            Ok(crs_id.to_string())
        }
    }

    fn sample_scan(company: &CompanyId) -> Scan {
        Scan {
            id: ScanId::generate(),
            company_id: company.clone(),
            dataset_id: DatasetId::generate(),
            dataset_version_id: DatasetVersionId::generate(),
            crs_id: lidar_control_core::ids::CrsId::new("crs-1"),
            status: ScanStatus::Created,
            schema_version: None,
            owner_department: None,
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn upload_raw_artifact_registers_available_row() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let catalog = Arc::new(FakeCatalog::new());
        let service = ArtifactService::new(object_store, catalog.clone(), "bucket");
        let company = CompanyId::new("co-1");
        let scan = sample_scan(&company);

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        std::io::Write::write_all(&mut file, b"points").expect("write");

        let artifact = service
            .upload_raw_artifact(&company, &scan, ArtifactKind::RawPointCloud, file.path(), Some("cloud.laz"), serde_json::json!({}))
            .expect("upload");
        assert_eq!(artifact.status, ArtifactStatus::Available);
        assert!(artifact.key.ends_with("raw/point_cloud/cloud.laz"));

        let duplicate = service.upload_raw_artifact(&company, &scan, ArtifactKind::RawPointCloud, file.path(), Some("cloud2.laz"), serde_json::json!({}));
        assert!(duplicate.is_err());
    }

    #[test]
    fn upload_raw_artifact_rejects_company_mismatch() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let catalog = Arc::new(FakeCatalog::new());
        let service = ArtifactService::new(object_store, catalog, "bucket");
        let scan = sample_scan(&CompanyId::new("co-1"));
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        std::io::Write::write_all(&mut file, b"points").expect("write");
        let err = service
            .upload_raw_artifact(&CompanyId::new("co-2"), &scan, ArtifactKind::RawPointCloud, file.path(), None, serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ArtifactServiceError::Unauthorized { .. }));
    }

    #[test]
    fn register_and_put_derived_ends_available_not_pending() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let catalog = Arc::new(FakeCatalog::new());
        let service = ArtifactService::new(object_store, catalog.clone(), "bucket");
        let company = CompanyId::new("co-1");
        let scan = sample_scan(&company);

        let artifact = service
            .register_and_put_derived(
                &company,
                &scan,
                "1",
                ArtifactKind::Derived("derived.ingest_manifest".to_string()),
                "tenants/co-1/manifest.json".to_string(),
                b"{}",
                "application/json",
                serde_json::json!({}),
            )
            .expect("register and put");
        assert_eq!(artifact.status, ArtifactStatus::Available);
        assert!(catalog.pending.lock().expect("lock").is_empty());
    }

    #[test]
    fn reconcile_pending_heals_present_objects_and_fails_absent_ones() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let catalog = Arc::new(FakeCatalog::new());
        let service = ArtifactService::new(object_store.clone(), catalog.clone(), "bucket");
        let company = CompanyId::new("co-1");
        let scan = sample_scan(&company);

        catalog
            .register_artifact(
                &company,
                &scan.id,
                &NewDerivedArtifact {
                    kind: ArtifactKind::Derived("derived.ingest_manifest".to_string()),
                    schema_version: "1".to_string(),
                    bucket: "bucket".to_string(),
                    key: "present.json".to_string(),
                    etag: None,
                    size_bytes: None,
                    status: ArtifactStatus::Pending,
                    meta: serde_json::json!({}),
                },
            )
            .expect("register pending");
        object_store
            .put_bytes(&ObjectRef::new("bucket", "present.json"), b"{}", "application/json")
            .expect("put");

        catalog
            .register_artifact(
                &company,
                &scan.id,
                &NewDerivedArtifact {
                    kind: ArtifactKind::Derived("derived.other".to_string()),
                    schema_version: "1".to_string(),
                    bucket: "bucket".to_string(),
                    key: "absent.json".to_string(),
                    etag: None,
                    size_bytes: None,
                    status: ArtifactStatus::Pending,
                    meta: serde_json::json!({}),
                },
            )
            .expect("register pending");

        let report = service.reconcile_pending(10).expect("reconcile");
        assert_eq!(report.healed, 1);
        assert_eq!(report.failed, 1);
    }
}
