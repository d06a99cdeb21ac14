// lidar-control-orchestrator/src/manifest_builder.rs
// ============================================================================
// Module: Manifest Builder (C12)
// Description: Deterministically folds raw artifacts + scan metadata + CRS
//              into a normalized ingest manifest JSON document.
// Purpose: Produce the `derived.ingest_manifest` artifact body consumed by
//          every downstream pipeline stage.
// Dependencies: lidar-control-core, serde_json
// ============================================================================

//! ## Overview
//! Field order is fixed by construction (insertion order into a
//! [`serde_json::Map`]), so the same inputs always serialize to the same
//! bytes. Scan-provided overrides under `scan.meta.manifest` are deep-merged
//! last and win over every computed section.

use lidar_control_core::model::Artifact;
use lidar_control_core::model::ArtifactKind;
use lidar_control_core::model::Crs;
use lidar_control_core::model::IngestRun;
use lidar_control_core::model::Scan;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// Classifies a raw point cloud key's format from its filename suffix.
#[must_use]
pub fn classify_point_cloud_format(key: &str) -> Option<&'static str> {
    if key.ends_with(".copc.laz") {
        Some("copc.laz")
    } else if key.ends_with(".laz") {
        Some("laz")
    } else if key.ends_with(".las") {
        Some("las")
    } else {
        None
    }
}

fn find_raw(raw_artifacts: &[Artifact], kind: &ArtifactKind) -> Option<&Artifact> {
    raw_artifacts.iter().find(|a| &a.kind == kind)
}

fn build_coordinate_system(crs: &Crs) -> Value {
    let mut cs = Map::new();
    cs.insert("crs_id".to_string(), json!(crs.id.as_str()));
    cs.insert("name".to_string(), json!(crs.name));
    cs.insert("units".to_string(), json!(crs.units));
    cs.insert("axis_order".to_string(), json!(crs.axis_order));
    if let Some(zone_degree) = crs.zone_degree {
        cs.insert("zone_degree".to_string(), json!(zone_degree));
    }
    if let Some(epsg) = crs.epsg {
        cs.insert("epsg".to_string(), json!(epsg));
    }
    if let Some(projjson) = crs.meta.get("projjson") {
        cs.insert("projjson".to_string(), projjson.clone());
    }
    if let Some(wkt) = crs.meta.get("wkt") {
        cs.insert("wkt".to_string(), wkt.clone());
    }
    Value::Object(cs)
}

fn build_control_points(raw_artifacts: &[Artifact]) -> (Value, bool) {
    let control_point = find_raw(raw_artifacts, &ArtifactKind::RawControlPoint);
    let verified = control_point.is_some();
    let mut cp = Map::new();
    cp.insert(
        "table".to_string(),
        control_point.map_or(Value::Null, |artifact| json!(artifact.key)),
    );
    cp.insert("verified_from_control_point".to_string(), json!(verified));
    (Value::Object(cp), verified)
}

fn build_raw_artifact_echo(artifact: &Artifact) -> Value {
    json!({
        "kind": artifact.kind.as_str(),
        "bucket": artifact.bucket,
        "key": artifact.key,
        "etag": artifact.etag,
        "size_bytes": artifact.size_bytes,
    })
}

fn build_ingest_section(run: &IngestRun, scan: &Scan, raw_artifacts: &[Artifact]) -> Value {
    let mut ingest = Map::new();
    ingest.insert(
        "run".to_string(),
        json!({
            "id": run.id.value(),
            "schema_version": run.schema_version,
            "input_fingerprint": run.input_fingerprint,
            "status": run.status,
        }),
    );
    ingest.insert(
        "scan".to_string(),
        json!({
            "id": scan.id.to_string(),
            "dataset_id": scan.dataset_id.to_string(),
            "dataset_version_id": scan.dataset_version_id.to_string(),
            "owner_department": scan.owner_department,
        }),
    );
    ingest.insert(
        "raw_artifacts".to_string(),
        Value::Array(raw_artifacts.iter().map(build_raw_artifact_echo).collect()),
    );
    Value::Object(ingest)
}

/// Deep-merges `overrides` into `base`: objects merge key-by-key recursively,
/// anything else (arrays, scalars) is replaced wholesale by `overrides`.
fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                deep_merge(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base_slot, overrides) => {
            *base_slot = overrides.clone();
        }
    }
}

/// Builds the ingest manifest document for one scan's completed ingest run.
///
/// `raw_artifacts` should be the scan's `AVAILABLE` raw artifacts, as
/// returned by `CatalogRepository::list_raw_artifacts`.
#[must_use]
pub fn build_ingest_manifest(run: &IngestRun, scan: &Scan, raw_artifacts: &[Artifact], crs: &Crs) -> Value {
    let point_cloud_format = find_raw(raw_artifacts, &ArtifactKind::RawPointCloud)
        .and_then(|artifact| classify_point_cloud_format(&artifact.key));

    let mut manifest = Map::new();
    manifest.insert("material".to_string(), scan.meta.get("material").cloned().unwrap_or(Value::Null));

    let mut coordinate_system = build_coordinate_system(crs);
    let (control_points, verified) = build_control_points(raw_artifacts);
    if verified {
        if let Value::Object(cs_map) = &mut coordinate_system {
            cs_map.insert("verified_from_control_point".to_string(), json!(true));
        }
    }
    manifest.insert("coordinate_system".to_string(), coordinate_system);

    manifest.insert(
        "z_measurement".to_string(),
        scan.meta.get("z_measurement").cloned().unwrap_or_else(|| json!({ "mode": "unspecified" })),
    );
    manifest.insert("control_points".to_string(), control_points);
    manifest.insert(
        "business_logic".to_string(),
        scan.meta.get("business_logic").cloned().unwrap_or_else(|| json!({})),
    );
    manifest.insert(
        "recording_modes".to_string(),
        scan.meta.get("recording_modes").cloned().unwrap_or_else(|| json!([])),
    );
    manifest.insert("point_cloud_format".to_string(), json!(point_cloud_format));
    manifest.insert("ingest".to_string(), build_ingest_section(run, scan, raw_artifacts));

    let mut manifest = Value::Object(manifest);
    if let Some(overrides) = scan.meta.get("manifest") {
        deep_merge(&mut manifest, overrides);
    }
    manifest
}
