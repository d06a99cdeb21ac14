// lidar-control-core/src/crs/presets.rs
// ============================================================================
// Module: МСК Regional Presets
// Description: Process-scoped, memoized loader for МСК zone parameters.
// Purpose: Resolve (region, zone) -> (lon_0, x_0, y_0) and an optional
//          region-level gost_towgs84 default.
// Dependencies: once_cell, serde_yaml
// ============================================================================

//! ## Overview
//! The preset table is loaded once per process from an embedded YAML
//! document behind a lazy once-initializer; no mutation after
//! initialization. The shape is
//! `region: {<region>: {gost_towgs84: str?, <zone>: {lon_0, x_0, y_0}}}`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

/// Embedded preset document. A real deployment would point this at an
/// operator-supplied file; this build ships the entries needed to exercise
/// every documented scenario.
const PRESETS_YAML: &str = r#"
region:
  "66":
    gost_towgs84: "23.57,-140.95,-79.8,0,0.35,0.79,-0.22"
    "1":
      lon_0: 60.05
      x_0: 1500000
      y_0: -5911057.63
  "50":
    "3":
      lon_0: 37.0
      x_0: 1250000
      y_0: 0
"#;

#[derive(Debug, Clone, Deserialize)]
struct ZoneParams {
    lon_0: f64,
    x_0: f64,
    y_0: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RegionEntry {
    #[serde(default)]
    gost_towgs84: Option<String>,
    #[serde(flatten)]
    zones: BTreeMap<String, ZoneParams>,
}

#[derive(Debug, Clone, Deserialize)]
struct PresetDocument {
    region: BTreeMap<String, RegionEntry>,
}

/// Resolved МСК zone parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MskZonePreset {
    /// Central meridian longitude, degrees.
    pub lon_0: f64,
    /// False easting, metres.
    pub x_0: f64,
    /// False northing, metres.
    pub y_0: f64,
}

/// Errors raised while loading or resolving presets.
#[derive(Debug, Error)]
pub enum PresetError {
    /// The embedded document failed to parse (a build-time invariant; should
    /// never happen outside of test fixtures for a malformed document).
    #[error("failed to parse МСК preset document: {0}")]
    Malformed(String),
    /// No preset exists for the requested `(region, zone)`.
    #[error("no МСК preset for region {region} zone {zone}")]
    NotFound {
        /// Region code.
        region: String,
        /// Zone number.
        zone: i32,
    },
}

fn document() -> Result<&'static PresetDocument, PresetError> {
    static DOC: OnceLock<Result<PresetDocument, String>> = OnceLock::new();
    let cell = DOC.get_or_init(|| {
        serde_yaml::from_str::<PresetDocument>(PRESETS_YAML).map_err(|err| err.to_string())
    });
    cell.as_ref().map_err(|err| PresetError::Malformed(err.clone()))
}

/// Looks up the zone parameters for `(region, zone)`.
///
/// # Errors
///
/// Returns [`PresetError::NotFound`] when no preset exists.
pub fn lookup_zone(region: &str, zone: i32) -> Result<MskZonePreset, PresetError> {
    let doc = document()?;
    let entry = doc
        .region
        .get(region)
        .ok_or_else(|| PresetError::NotFound { region: region.to_string(), zone })?;
    let params = entry
        .zones
        .get(&zone.to_string())
        .ok_or_else(|| PresetError::NotFound { region: region.to_string(), zone })?;
    Ok(MskZonePreset { lon_0: params.lon_0, x_0: params.x_0, y_0: params.y_0 })
}

/// Looks up the region-level default `gost_towgs84` string, if any.
///
/// # Errors
///
/// Returns [`PresetError::Malformed`] only if the embedded document itself
/// fails to parse.
pub fn lookup_region_towgs84(region: &str) -> Result<Option<String>, PresetError> {
    let doc = document()?;
    Ok(doc.region.get(region).and_then(|entry| entry.gost_towgs84.clone()))
}

/// Parses a comma-separated 7-parameter `towgs84` string into floats.
///
/// # Errors
///
/// Returns [`PresetError::Malformed`] when the string does not contain
/// exactly seven comma-separated numbers.
pub fn parse_towgs84(raw: &str) -> Result<[f64; 7], PresetError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 7 {
        return Err(PresetError::Malformed(format!("expected 7 towgs84 components, got {}", parts.len())));
    }
    let mut out = [0.0_f64; 7];
    for (i, part) in parts.iter().enumerate() {
        out[i] = part
            .parse::<f64>()
            .map_err(|err| PresetError::Malformed(format!("invalid towgs84 component `{part}`: {err}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    #[test]
    fn resolves_msk_66_zone_1() {
        let zone = lookup_zone("66", 1).expect("preset");
        assert_eq!(zone.lon_0, 60.05);
        assert_eq!(zone.x_0, 1_500_000.0);
        assert_eq!(zone.y_0, -5_911_057.63);
    }

    #[test]
    fn resolves_region_towgs84_default() {
        let towgs84 = lookup_region_towgs84("66").expect("lookup").expect("present");
        let parsed = parse_towgs84(&towgs84).expect("parse");
        assert_eq!(parsed, [23.57, -140.95, -79.8, 0.0, 0.35, 0.79, -0.22]);
    }

    #[test]
    fn missing_zone_is_not_found() {
        assert!(lookup_zone("66", 99).is_err());
        assert!(lookup_zone("1", 1).is_err());
    }
}
