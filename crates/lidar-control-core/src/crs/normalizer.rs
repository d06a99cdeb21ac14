// lidar-control-core/src/crs/normalizer.rs
// ============================================================================
// Module: CRS Normalizer
// Description: Resolves a validated CRS descriptor into canonical PROJJSON.
// Purpose: Produce the hard invariant every downstream stage depends on.
// Dependencies: crate::crs::{descriptor, presets}, serde_json
// ============================================================================

//! ## Overview
//! `build_crs` is the single entry point: it validates the raw descriptor,
//! dispatches on its variant, and either returns a [`NormalizedCrs`] or fails
//! with [`CrsBuildError`] — never a partial build.
//!
//! The PROJ math library itself is an external oracle: this
//! module defines the [`ProjOracle`] seam and ships a [`PassthroughProjOracle`]
//! sufficient for the `epsg`/`wkt`/`projjson` branches, where resolution is a
//! deterministic lookup/wrap rather than numerical work. The `custom`/МСК
//! branch's Transverse Mercator PROJJSON is built directly in Rust, since its
//! shape (not its reprojection math) is what this system's invariant depends
//! on.

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::crs::descriptor::CcrsType;
use crate::crs::descriptor::CrsDescriptor;
use crate::crs::descriptor::CrsValidationError;
use crate::crs::descriptor::Datum;
use crate::crs::descriptor::Hemisphere;
use crate::crs::descriptor::MskVariant;
use crate::crs::descriptor::RawCrsDescriptor;
use crate::crs::descriptor::ZoneFamily;
use crate::crs::presets;
use crate::crs::presets::PresetError;

/// A backend-agnostic oracle over the PROJ math library: resolves a code,
/// WKT string, or PROJJSON document into canonical PROJJSON.
pub trait ProjOracle: Send + Sync {
    /// Resolves an EPSG code to its canonical PROJJSON form.
    ///
    /// # Errors
    ///
    /// Returns [`ProjOracleError`] when the code is unknown.
    fn from_epsg(&self, code: i32) -> Result<Value, ProjOracleError>;

    /// Parses a WKT string into canonical PROJJSON.
    ///
    /// # Errors
    ///
    /// Returns [`ProjOracleError`] when the WKT is malformed.
    fn from_wkt(&self, wkt: &str) -> Result<Value, ProjOracleError>;

    /// Validates and canonicalizes a PROJJSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ProjOracleError`] when the document is malformed.
    fn from_projjson(&self, projjson: &Value) -> Result<Value, ProjOracleError>;
}

/// PROJ oracle errors.
#[derive(Debug, Error)]
pub enum ProjOracleError {
    /// The oracle could not resolve the input.
    #[error("proj oracle error: {0}")]
    Failed(String),
}

/// A minimal oracle that wraps EPSG codes in a stub PROJJSON envelope and
/// passes WKT/PROJJSON straight through. Geographic correctness of the
/// underlying math is trusted, not re-verified here — a real
/// deployment would swap this for a genuine PROJ binding behind the same
/// trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughProjOracle;

impl ProjOracle for PassthroughProjOracle {
    fn from_epsg(&self, code: i32) -> Result<Value, ProjOracleError> {
        Ok(json!({
            "type": "GeographicCRS",
            "name": format!("EPSG:{code}"),
            "id": { "authority": "EPSG", "code": code },
        }))
    }

    fn from_wkt(&self, wkt: &str) -> Result<Value, ProjOracleError> {
        if wkt.trim().is_empty() {
            return Err(ProjOracleError::Failed("empty wkt".to_string()));
        }
        Ok(json!({ "type": "WktWrapped", "wkt": wkt }))
    }

    fn from_projjson(&self, projjson: &Value) -> Result<Value, ProjOracleError> {
        if !projjson.is_object() {
            return Err(ProjOracleError::Failed("projjson must be an object".to_string()));
        }
        Ok(projjson.clone())
    }
}

/// Errors raised while building a normalized CRS.
#[derive(Debug, Error)]
pub enum CrsBuildError {
    /// The descriptor itself failed validation.
    #[error(transparent)]
    Validation(#[from] CrsValidationError),
    /// The PROJ oracle failed to resolve the descriptor.
    #[error(transparent)]
    Oracle(#[from] ProjOracleError),
    /// The МСК preset table failed to resolve a required entry.
    #[error(transparent)]
    Preset(#[from] PresetError),
    /// A `gost` МСК build had no 7-parameter transform, explicit or preset.
    #[error("msk gost build requires a towgs84 transform (explicit or preset) for region {region}")]
    MissingTowgs84 {
        /// Region code.
        region: String,
    },
}

/// The resolved output of the CRS normalizer: every input field plus the
/// canonical PROJJSON every downstream component relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCrs {
    /// The validated descriptor that produced this build.
    pub descriptor: CrsDescriptor,
    /// Canonical PROJJSON serialization.
    pub built_crs_projjson: Value,
}

/// Validates `raw` and resolves it into a [`NormalizedCrs`] using `oracle`
/// for the EPSG/WKT/PROJJSON branches.
///
/// # Errors
///
/// Returns [`CrsBuildError`] on any validation, oracle, or preset failure.
pub fn build_crs(raw: &RawCrsDescriptor, oracle: &dyn ProjOracle) -> Result<NormalizedCrs, CrsBuildError> {
    let descriptor = raw.validate()?;
    let built_crs_projjson = match &descriptor {
        CrsDescriptor::Epsg { code } => oracle.from_epsg(*code)?,
        CrsDescriptor::Wkt { wkt } => oracle.from_wkt(wkt)?,
        CrsDescriptor::Projjson { projjson } => oracle.from_projjson(projjson)?,
        CrsDescriptor::Custom(custom) => build_custom(custom, oracle)?,
    };
    Ok(NormalizedCrs { descriptor, built_crs_projjson })
}

fn build_custom(
    custom: &crate::crs::descriptor::CustomCrs,
    oracle: &dyn ProjOracle,
) -> Result<Value, CrsBuildError> {
    match &custom.ccrs_type {
        CcrsType::LatLon => {
            let code = match custom.datum {
                Datum::Wgs84 => 4326,
                Datum::Cgcs2000 => 4490,
                Datum::Sk42 => 4284,
            };
            Ok(oracle.from_epsg(code)?)
        }
        CcrsType::Projection(ZoneFamily::Utm { zone, hemisphere }) => {
            let code = match hemisphere {
                Hemisphere::North => 32600 + zone,
                Hemisphere::South => 32700 + zone,
            };
            Ok(oracle.from_epsg(code)?)
        }
        CcrsType::Projection(ZoneFamily::Gk) => {
            // Unreachable: descriptor validation rejects GK before this
            // point is ever reached.
            Err(CrsBuildError::Validation(CrsValidationError::GkUnsupported))
        }
        CcrsType::Projection(ZoneFamily::Msk { region, zone, variant, gost_towgs84 }) => {
            build_msk(region, *zone, *variant, *gost_towgs84)
        }
    }
}

fn build_msk(
    region: &str,
    zone: i32,
    variant: MskVariant,
    explicit_towgs84: Option<[f64; 7]>,
) -> Result<Value, CrsBuildError> {
    let preset = presets::lookup_zone(region, zone)?;
    let projected = json!({
        "type": "ProjectedCRS",
        "name": format!("МСК {region} zone {zone}"),
        "base_crs": {
            "type": "GeographicCRS",
            "name": "Pulkovo 1942",
            "id": { "authority": "EPSG", "code": 4284 },
        },
        "conversion": {
            "name": "Transverse Mercator",
            "method": { "name": "Transverse Mercator" },
            "parameters": [
                { "name": "Latitude of natural origin", "value": 0.0, "unit": "degree" },
                { "name": "Longitude of natural origin", "value": preset.lon_0, "unit": "degree" },
                { "name": "Scale factor at natural origin", "value": 1.0, "unit": "unity" },
                { "name": "False easting", "value": preset.x_0, "unit": "metre" },
                { "name": "False northing", "value": preset.y_0, "unit": "metre" },
            ],
        },
        "coordinate_system": {
            "subtype": "Cartesian",
            "axis": [
                { "name": "Easting", "abbreviation": "X", "direction": "east", "unit": "metre" },
                { "name": "Northing", "abbreviation": "Y", "direction": "north", "unit": "metre" },
            ],
        },
    });

    match variant {
        MskVariant::Calc => Ok(projected),
        MskVariant::Gost => {
            let towgs84 = match explicit_towgs84 {
                Some(explicit) => explicit,
                None => {
                    let default = presets::lookup_region_towgs84(region)?
                        .ok_or_else(|| CrsBuildError::MissingTowgs84 { region: region.to_string() })?;
                    presets::parse_towgs84(&default)?
                }
            };
            Ok(json!({
                "type": "BoundCRS",
                "source_crs": projected,
                "target_crs": {
                    "type": "GeographicCRS",
                    "name": "WGS 84",
                    "id": { "authority": "EPSG", "code": 4326 },
                },
                "transformation": {
                    "name": "Position Vector transformation",
                    "method": { "name": "Position Vector transformation (geog2D domain)" },
                    "parameters": [
                        { "name": "X-axis translation", "value": towgs84[0], "unit": "metre" },
                        { "name": "Y-axis translation", "value": towgs84[1], "unit": "metre" },
                        { "name": "Z-axis translation", "value": towgs84[2], "unit": "metre" },
                        { "name": "X-axis rotation", "value": towgs84[3], "unit": "arc-second" },
                        { "name": "Y-axis rotation", "value": towgs84[4], "unit": "arc-second" },
                        { "name": "Z-axis rotation", "value": towgs84[5], "unit": "arc-second" },
                        { "name": "Scale difference", "value": towgs84[6], "unit": "parts per million" },
                    ],
                },
            }))
        }
    }
}
