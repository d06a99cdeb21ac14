// lidar-control-core/src/crs/mod.rs
// ============================================================================
// Module: CRS (Coordinate Reference System)
// Description: Wires descriptor validation, МСК presets, and normalization.
// ============================================================================

pub mod descriptor;
pub mod normalizer;
pub mod presets;

pub use descriptor::CcrsType;
pub use descriptor::CrsDescriptor;
pub use descriptor::CrsValidationError;
pub use descriptor::CustomCrs;
pub use descriptor::Datum;
pub use descriptor::Hemisphere;
pub use descriptor::MskVariant;
pub use descriptor::RawCrsDescriptor;
pub use descriptor::ZMode;
pub use descriptor::ZoneFamily;
pub use normalizer::CrsBuildError;
pub use normalizer::NormalizedCrs;
pub use normalizer::PassthroughProjOracle;
pub use normalizer::ProjOracle;
pub use normalizer::ProjOracleError;
pub use normalizer::build_crs;
pub use presets::MskZonePreset;
pub use presets::PresetError;
