// lidar-control-core/src/crs/descriptor.rs
// ============================================================================
// Module: CRS Descriptor Validation
// Description: Validates a tagged CRS descriptor into a sealed variant type.
// Purpose: Turn the wire's dynamic discriminated union into an exhaustively
//          matched Rust enum before any PROJ/preset resolution runs.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The wire shape is a Pydantic-style `discriminator="crs_source"` union in
//! the source system. Here it becomes a two-stage process: deserialize into
//! [`RawCrsDescriptor`] (every field optional, unknown fields rejected), then
//! [`RawCrsDescriptor::validate`] turns it into the sealed [`CrsDescriptor`]
//! enum or fails with an enumerated [`CrsValidationError`] — no partial
//! build is ever returned.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The wire-level descriptor: every field optional, discriminated by
/// `crs_source`. Unknown top-level fields are rejected at deserialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCrsDescriptor {
    /// Discriminator: `"epsg" | "wkt" | "projjson" | "custom"`.
    pub crs_source: String,
    /// Required when `crs_source == "epsg"`.
    #[serde(default)]
    pub epsg_code: Option<i32>,
    /// Required when `crs_source == "wkt"`.
    #[serde(default)]
    pub wkt: Option<String>,
    /// Required when `crs_source == "projjson"`.
    #[serde(default)]
    pub projjson: Option<serde_json::Value>,
    /// Required when `crs_source == "custom"`: `"latlon" | "projection"`.
    #[serde(default)]
    pub ccrs_type: Option<String>,
    /// Required when `crs_source == "custom"`: `"WGS84" | "CGCS2000" | "SK42"`.
    #[serde(default)]
    pub datum: Option<String>,
    /// Required when `crs_source == "custom"`: `"ellipsoidal" | "orthometric"`.
    #[serde(default)]
    pub z_mode: Option<String>,
    /// Required when `z_mode == "orthometric"`.
    #[serde(default)]
    pub geoid_model: Option<String>,
    /// Required when `crs_source == "custom"`.
    #[serde(default)]
    pub axis_order: Option<String>,
    /// Required when `crs_source == "custom"`: `"degree" | "metre"`.
    #[serde(default)]
    pub units: Option<String>,
    /// Required when `ccrs_type == "projection"`: `"UTM" | "GK" | "МСК"`.
    #[serde(default)]
    pub zone_family: Option<String>,
    /// Required for `zone_family == "UTM"`, range `[1, 60]`.
    #[serde(default)]
    pub utm_zone: Option<i32>,
    /// Required for `zone_family == "UTM"`: `"N" | "S"`.
    #[serde(default)]
    pub utm_hemisphere: Option<String>,
    /// Required for `zone_family == "МСК"`.
    #[serde(default)]
    pub msk_region: Option<String>,
    /// Required for `zone_family == "МСК"`.
    #[serde(default)]
    pub msk_zone: Option<i32>,
    /// Required for `zone_family == "МСК"`: `"calc" | "gost"`.
    #[serde(default)]
    pub msk_variant: Option<String>,
    /// 7-parameter Position Vector transform, required for `msk_variant ==
    /// "gost"` unless a preset supplies one.
    #[serde(default)]
    pub gost_towgs84: Option<[f64; 7]>,
    /// Required for `msk_variant == "gost"`: must equal `"position_vector"`,
    /// the only Helmert convention this system supports.
    #[serde(default)]
    pub helmert_convention: Option<String>,
}

/// Hemisphere for a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    /// Northern hemisphere.
    North,
    /// Southern hemisphere.
    South,
}

/// Datum for a custom CRS descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datum {
    /// WGS84.
    Wgs84,
    /// CGCS2000.
    Cgcs2000,
    /// SK-42 (Pulkovo 1942).
    Sk42,
}

/// Vertical measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZMode {
    /// Height above the reference ellipsoid.
    Ellipsoidal,
    /// Height above a geoid model.
    Orthometric,
}

/// МСК (MSK) build variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MskVariant {
    /// Calculated parameters only, no datum shift wrapper.
    Calc,
    /// GOST-conformant Helmert 7-parameter BoundCRS wrapper.
    Gost,
}

/// A validated zone/projection family selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZoneFamily {
    /// Universal Transverse Mercator.
    Utm {
        /// Zone number, `1..=60`.
        zone: i32,
        /// Hemisphere.
        hemisphere: Hemisphere,
    },
    /// Gauss-Kruger: not supported in v1.
    Gk,
    /// МСК (regional Russian coordinate system).
    Msk {
        /// Region code.
        region: String,
        /// Zone number within the region.
        zone: i32,
        /// Build variant.
        variant: MskVariant,
        /// Explicit 7-parameter transform, when supplied on the wire.
        gost_towgs84: Option<[f64; 7]>,
    },
}

/// A validated custom CRS descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCrs {
    /// Whether this is a lat/lon or projected custom CRS.
    pub ccrs_type: CcrsType,
    /// Datum.
    pub datum: Datum,
    /// Vertical measurement mode.
    pub z_mode: ZMode,
    /// Geoid model name, present only for `z_mode == Orthometric`.
    pub geoid_model: Option<String>,
    /// Axis order label, carried through verbatim.
    pub axis_order: String,
}

/// Discriminates the two custom CRS shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CcrsType {
    /// Geographic lat/lon CRS.
    LatLon,
    /// Projected CRS.
    Projection(ZoneFamily),
}

/// A fully validated CRS descriptor: exactly one build path is reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CrsDescriptor {
    /// Build from an EPSG code.
    Epsg {
        /// EPSG numeric code.
        code: i32,
    },
    /// Build by parsing a WKT string through the PROJ oracle.
    Wkt {
        /// WKT text.
        wkt: String,
    },
    /// Build by parsing a PROJJSON document through the PROJ oracle.
    Projjson {
        /// PROJJSON document.
        projjson: serde_json::Value,
    },
    /// Build a custom CRS descriptor.
    Custom(CustomCrs),
}

/// Enumerates exactly which validation rule was broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrsValidationError {
    /// `crs_source` was not one of the four known tags.
    #[error("unknown crs_source: {0}")]
    UnknownSource(String),
    /// A field required by the branch was missing.
    #[error("missing required field `{field}` for crs_source `{source}`")]
    MissingField {
        /// Field name.
        field: &'static str,
        /// Branch the field was required for.
        source: &'static str,
    },
    /// A field forbidden by the branch was present.
    #[error("field `{field}` is not allowed for crs_source `{source}`")]
    ForbiddenField {
        /// Field name.
        field: &'static str,
        /// Branch the field is forbidden for.
        source: &'static str,
    },
    /// A field had a value outside its allowed set/range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// Gauss-Kruger zones are not supported in v1.
    #[error("gk zone family is not supported in v1")]
    GkUnsupported,
}

impl RawCrsDescriptor {
    /// Validates this raw descriptor into a sealed [`CrsDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns [`CrsValidationError`] enumerating the first broken rule.
    pub fn validate(&self) -> Result<CrsDescriptor, CrsValidationError> {
        match self.crs_source.as_str() {
            "epsg" => self.validate_epsg(),
            "wkt" => self.validate_wkt(),
            "projjson" => self.validate_projjson(),
            "custom" => self.validate_custom(),
            other => Err(CrsValidationError::UnknownSource(other.to_string())),
        }
    }

    fn validate_epsg(&self) -> Result<CrsDescriptor, CrsValidationError> {
        forbid(self.wkt.is_some(), "wkt", "epsg")?;
        forbid(self.projjson.is_some(), "projjson", "epsg")?;
        forbid(self.ccrs_type.is_some(), "ccrs_type", "epsg")?;
        let code = self
            .epsg_code
            .ok_or(CrsValidationError::MissingField { field: "epsg_code", source: "epsg" })?;
        Ok(CrsDescriptor::Epsg { code })
    }

    fn validate_wkt(&self) -> Result<CrsDescriptor, CrsValidationError> {
        forbid(self.epsg_code.is_some(), "epsg_code", "wkt")?;
        forbid(self.projjson.is_some(), "projjson", "wkt")?;
        forbid(self.ccrs_type.is_some(), "ccrs_type", "wkt")?;
        let wkt = self
            .wkt
            .clone()
            .ok_or(CrsValidationError::MissingField { field: "wkt", source: "wkt" })?;
        Ok(CrsDescriptor::Wkt { wkt })
    }

    fn validate_projjson(&self) -> Result<CrsDescriptor, CrsValidationError> {
        forbid(self.epsg_code.is_some(), "epsg_code", "projjson")?;
        forbid(self.wkt.is_some(), "wkt", "projjson")?;
        forbid(self.ccrs_type.is_some(), "ccrs_type", "projjson")?;
        let projjson = self
            .projjson
            .clone()
            .ok_or(CrsValidationError::MissingField { field: "projjson", source: "projjson" })?;
        Ok(CrsDescriptor::Projjson { projjson })
    }

    fn validate_custom(&self) -> Result<CrsDescriptor, CrsValidationError> {
        forbid(self.epsg_code.is_some(), "epsg_code", "custom")?;
        forbid(self.wkt.is_some(), "wkt", "custom")?;
        forbid(self.projjson.is_some(), "projjson", "custom")?;

        let ccrs_type_raw = self
            .ccrs_type
            .as_deref()
            .ok_or(CrsValidationError::MissingField { field: "ccrs_type", source: "custom" })?;
        let datum_raw = self
            .datum
            .as_deref()
            .ok_or(CrsValidationError::MissingField { field: "datum", source: "custom" })?;
        let z_mode_raw = self
            .z_mode
            .as_deref()
            .ok_or(CrsValidationError::MissingField { field: "z_mode", source: "custom" })?;
        let axis_order = self
            .axis_order
            .clone()
            .ok_or(CrsValidationError::MissingField { field: "axis_order", source: "custom" })?;

        let datum = match datum_raw {
            "WGS84" => Datum::Wgs84,
            "CGCS2000" => Datum::Cgcs2000,
            "SK42" => Datum::Sk42,
            other => {
                return Err(CrsValidationError::InvalidValue {
                    field: "datum",
                    reason: format!("unknown datum `{other}`"),
                });
            }
        };

        let z_mode = match z_mode_raw {
            "ellipsoidal" => ZMode::Ellipsoidal,
            "orthometric" => ZMode::Orthometric,
            other => {
                return Err(CrsValidationError::InvalidValue {
                    field: "z_mode",
                    reason: format!("unknown z_mode `{other}`"),
                });
            }
        };
        let geoid_model = if matches!(z_mode, ZMode::Orthometric) {
            Some(self.geoid_model.clone().ok_or(CrsValidationError::MissingField {
                field: "geoid_model",
                source: "custom (z_mode=orthometric)",
            })?)
        } else {
            None
        };

        let units = self
            .units
            .as_deref()
            .ok_or(CrsValidationError::MissingField { field: "units", source: "custom" })?;

        let ccrs_type = match ccrs_type_raw {
            "latlon" => {
                forbid(self.zone_family.is_some(), "zone_family", "custom/latlon")?;
                if units != "degree" {
                    return Err(CrsValidationError::InvalidValue {
                        field: "units",
                        reason: "custom/latlon requires units=degree".to_string(),
                    });
                }
                CcrsType::LatLon
            }
            "projection" => {
                if units != "metre" {
                    return Err(CrsValidationError::InvalidValue {
                        field: "units",
                        reason: "custom/projection requires units=metre".to_string(),
                    });
                }
                CcrsType::Projection(self.validate_zone_family(datum)?)
            }
            other => {
                return Err(CrsValidationError::InvalidValue {
                    field: "ccrs_type",
                    reason: format!("unknown ccrs_type `{other}`"),
                });
            }
        };

        Ok(CrsDescriptor::Custom(CustomCrs {
            ccrs_type,
            datum,
            z_mode,
            geoid_model,
            axis_order,
        }))
    }

    fn validate_zone_family(&self, datum: Datum) -> Result<ZoneFamily, CrsValidationError> {
        let family = self.zone_family.as_deref().ok_or(CrsValidationError::MissingField {
            field: "zone_family",
            source: "custom/projection",
        })?;
        match family {
            "UTM" => {
                if datum != Datum::Wgs84 {
                    return Err(CrsValidationError::InvalidValue {
                        field: "datum",
                        reason: "only WGS84 is supported for UTM".to_string(),
                    });
                }
                let zone = self.utm_zone.ok_or(CrsValidationError::MissingField {
                    field: "utm_zone",
                    source: "custom/projection/UTM",
                })?;
                if !(1..=60).contains(&zone) {
                    return Err(CrsValidationError::InvalidValue {
                        field: "utm_zone",
                        reason: format!("utm_zone {zone} out of range [1, 60]"),
                    });
                }
                let hemisphere = match self.utm_hemisphere.as_deref() {
                    Some("N") => Hemisphere::North,
                    Some("S") => Hemisphere::South,
                    _ => {
                        return Err(CrsValidationError::MissingField {
                            field: "utm_hemisphere",
                            source: "custom/projection/UTM",
                        });
                    }
                };
                Ok(ZoneFamily::Utm { zone, hemisphere })
            }
            "GK" => Err(CrsValidationError::GkUnsupported),
            "МСК" => {
                if datum != Datum::Sk42 {
                    return Err(CrsValidationError::InvalidValue {
                        field: "datum",
                        reason: "МСК requires datum=SK42".to_string(),
                    });
                }
                let region = self.msk_region.clone().ok_or(CrsValidationError::MissingField {
                    field: "msk_region",
                    source: "custom/projection/МСК",
                })?;
                let zone = self.msk_zone.ok_or(CrsValidationError::MissingField {
                    field: "msk_zone",
                    source: "custom/projection/МСК",
                })?;
                let variant = match self.msk_variant.as_deref() {
                    Some("calc") => MskVariant::Calc,
                    Some("gost") => MskVariant::Gost,
                    _ => {
                        return Err(CrsValidationError::MissingField {
                            field: "msk_variant",
                            source: "custom/projection/МСК",
                        });
                    }
                };
                if matches!(variant, MskVariant::Gost) {
                    match self.helmert_convention.as_deref() {
                        Some("position_vector") => {}
                        Some(other) => {
                            return Err(CrsValidationError::InvalidValue {
                                field: "helmert_convention",
                                reason: format!("unsupported helmert_convention `{other}`, only `position_vector` is supported"),
                            });
                        }
                        None => {
                            return Err(CrsValidationError::MissingField {
                                field: "helmert_convention",
                                source: "custom/projection/МСК/gost",
                            });
                        }
                    }
                }
                Ok(ZoneFamily::Msk {
                    region,
                    zone,
                    variant,
                    gost_towgs84: self.gost_towgs84,
                })
            }
            other => Err(CrsValidationError::InvalidValue {
                field: "zone_family",
                reason: format!("unknown zone_family `{other}`"),
            }),
        }
    }
}

fn forbid(present: bool, field: &'static str, source: &'static str) -> Result<(), CrsValidationError> {
    if present {
        Err(CrsValidationError::ForbiddenField { field, source })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    fn base() -> RawCrsDescriptor {
        RawCrsDescriptor {
            crs_source: "epsg".to_string(),
            epsg_code: None,
            wkt: None,
            projjson: None,
            ccrs_type: None,
            datum: None,
            z_mode: None,
            geoid_model: None,
            axis_order: None,
            units: None,
            zone_family: None,
            utm_zone: None,
            utm_hemisphere: None,
            msk_region: None,
            msk_zone: None,
            msk_variant: None,
            gost_towgs84: None,
            helmert_convention: None,
        }
    }

    #[test]
    fn epsg_requires_code_and_forbids_others() {
        let mut d = base();
        assert!(d.validate().is_err());
        d.epsg_code = Some(4326);
        assert_eq!(d.validate().expect("valid"), CrsDescriptor::Epsg { code: 4326 });
        d.wkt = Some("x".to_string());
        assert!(d.validate().is_err());
    }

    #[test]
    fn utm_zone_boundaries() {
        let mut d = base();
        d.crs_source = "custom".to_string();
        d.ccrs_type = Some("projection".to_string());
        d.datum = Some("WGS84".to_string());
        d.z_mode = Some("ellipsoidal".to_string());
        d.axis_order = Some("enu".to_string());
        d.units = Some("metre".to_string());
        d.zone_family = Some("UTM".to_string());
        d.utm_hemisphere = Some("N".to_string());

        d.utm_zone = Some(0);
        assert!(d.validate().is_err());
        d.utm_zone = Some(61);
        assert!(d.validate().is_err());
        d.utm_zone = Some(1);
        assert!(d.validate().is_ok());
        d.utm_zone = Some(60);
        assert!(d.validate().is_ok());
        d.utm_hemisphere = Some("X".to_string());
        assert!(d.validate().is_err());
    }

    #[test]
    fn gk_is_explicitly_rejected() {
        let mut d = base();
        d.crs_source = "custom".to_string();
        d.ccrs_type = Some("projection".to_string());
        d.datum = Some("SK42".to_string());
        d.z_mode = Some("ellipsoidal".to_string());
        d.axis_order = Some("enu".to_string());
        d.units = Some("metre".to_string());
        d.zone_family = Some("GK".to_string());
        assert_eq!(d.validate().unwrap_err(), CrsValidationError::GkUnsupported);
    }

    fn msk_gost_base() -> RawCrsDescriptor {
        let mut d = base();
        d.crs_source = "custom".to_string();
        d.ccrs_type = Some("projection".to_string());
        d.datum = Some("SK42".to_string());
        d.z_mode = Some("ellipsoidal".to_string());
        d.axis_order = Some("enu".to_string());
        d.units = Some("metre".to_string());
        d.zone_family = Some("МСК".to_string());
        d.msk_region = Some("66".to_string());
        d.msk_zone = Some(1);
        d.msk_variant = Some("gost".to_string());
        d
    }

    #[test]
    fn msk_gost_without_towgs84_still_validates_descriptor() {
        // The descriptor itself validates; the preset/towgs84 requirement is
        // enforced at build time in `normalizer`, not at descriptor
        // validation time, since a region preset may supply the transform.
        let mut d = msk_gost_base();
        d.helmert_convention = Some("position_vector".to_string());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn msk_gost_requires_helmert_convention() {
        let d = msk_gost_base();
        assert_eq!(
            d.validate().unwrap_err(),
            CrsValidationError::MissingField { field: "helmert_convention", source: "custom/projection/МСК/gost" }
        );
    }

    #[test]
    fn msk_gost_rejects_non_position_vector_convention() {
        let mut d = msk_gost_base();
        d.helmert_convention = Some("coordinate_frame".to_string());
        assert!(matches!(d.validate().unwrap_err(), CrsValidationError::InvalidValue { field: "helmert_convention", .. }));
    }

    #[test]
    fn orthometric_requires_geoid_model() {
        let mut d = base();
        d.crs_source = "custom".to_string();
        d.ccrs_type = Some("latlon".to_string());
        d.datum = Some("WGS84".to_string());
        d.z_mode = Some("orthometric".to_string());
        d.axis_order = Some("enu".to_string());
        d.units = Some("degree".to_string());
        assert!(d.validate().is_err());
        d.geoid_model = Some("egm2008".to_string());
        assert!(d.validate().is_ok());
    }
}
