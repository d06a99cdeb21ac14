// lidar-control-config/src/lib.rs
// ============================================================================
// Crate: lidar-control-config
// Description: Typed, environment-sourced settings for the control plane.
// Purpose: Single fail-closed entry point (`Settings::from_env`) for every
//          DSN, endpoint, credential, and override the process needs.
// Dependencies: lidar-control-core, thiserror
// ============================================================================

//! ## Overview
//! Every field is read with strict UTF-8 enforcement and validated before
//! `Settings` is handed to the rest of the process; there are no silent
//! defaults for anything that touches a live backend.

use std::env::VarError;

use lidar_control_core::scenario::ScenarioRoute;
use thiserror::Error;

/// Canonical environment variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    /// Status store backend locator.
    KeydbDsn,
    /// Broker locator.
    RabbitDsn,
    /// Workflow engine gateway endpoint.
    TemporalDsn,
    /// Catalog Postgres connection string.
    PgDsn,
    /// S3-compatible endpoint URL.
    S3Endpoint,
    /// S3 access key id.
    S3AccessKey,
    /// S3 secret access key.
    S3SecretKey,
    /// S3 bucket name.
    S3Bucket,
    /// S3 region.
    S3Region,
    /// Optional scenario registry override string.
    ScenarioVersionOverrides,
    /// `tracing`-style filter string.
    RustLog,
}

impl EnvKey {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeydbDsn => "KEYDB_DSN",
            Self::RabbitDsn => "RABBIT_DSN",
            Self::TemporalDsn => "TEMPORAL_DSN",
            Self::PgDsn => "PG_DSN",
            Self::S3Endpoint => "S3_ENDPOINT",
            Self::S3AccessKey => "S3_ACCESS_KEY",
            Self::S3SecretKey => "S3_SECRET_KEY",
            Self::S3Bucket => "S3_BUCKET",
            Self::S3Region => "S3_REGION",
            Self::ScenarioVersionOverrides => "SCENARIO_VERSION_OVERRIDES",
            Self::RustLog => "RUST_LOG",
        }
    }
}

/// Errors raised while loading or validating settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),
    /// An environment variable contained invalid UTF-8.
    #[error("environment variable `{0}` is not valid UTF-8")]
    NotUnicode(&'static str),
    /// A value failed validation.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// S3-compatible object store connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Endpoint URL.
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Bucket name.
    pub bucket: String,
    /// Region.
    pub region: String,
}

/// One scenario registry override parsed from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOverride {
    /// Scenario name.
    pub scenario: String,
    /// Pipeline version.
    pub pipeline_version: String,
    /// The route to install for this key.
    pub route: ScenarioRoute,
}

/// Fully validated, environment-sourced process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Status store DSN.
    pub keydb_dsn: String,
    /// Broker DSN.
    pub rabbit_dsn: String,
    /// Workflow engine gateway endpoint.
    pub temporal_dsn: String,
    /// Catalog Postgres DSN.
    pub pg_dsn: String,
    /// Object store connection parameters.
    pub s3: S3Settings,
    /// Scenario registry overrides, in the order declared.
    pub scenario_overrides: Vec<ScenarioOverride>,
    /// `tracing`-style filter string; defaulted when absent.
    pub log_filter: String,
}

impl Settings {
    /// Loads and validates settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on the first missing or invalid field.
    pub fn from_env() -> Result<Self, ConfigError> {
        let keydb_dsn = require_nonempty(EnvKey::KeydbDsn)?;
        let rabbit_dsn = require_nonempty(EnvKey::RabbitDsn)?;
        let temporal_dsn = require_nonempty(EnvKey::TemporalDsn)?;
        let pg_dsn = require_nonempty(EnvKey::PgDsn)?;
        let s3 = S3Settings {
            endpoint: require_nonempty(EnvKey::S3Endpoint)?,
            access_key: require_nonempty(EnvKey::S3AccessKey)?,
            secret_key: require_nonempty(EnvKey::S3SecretKey)?,
            bucket: validate_bucket(require_nonempty(EnvKey::S3Bucket)?)?,
            region: validate_region(require_nonempty(EnvKey::S3Region)?)?,
        };
        let scenario_overrides = match read_env_strict(EnvKey::ScenarioVersionOverrides)? {
            Some(raw) if !raw.trim().is_empty() => parse_scenario_overrides(&raw)?,
            _ => Vec::new(),
        };
        let log_filter = read_env_strict(EnvKey::RustLog)?.unwrap_or_else(|| "info".to_string());

        Ok(Self {
            keydb_dsn,
            rabbit_dsn,
            temporal_dsn,
            pg_dsn,
            s3,
            scenario_overrides,
            log_filter,
        })
    }
}

fn read_env_strict(key: EnvKey) -> Result<Option<String>, ConfigError> {
    match std::env::var(key.as_str()) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key.as_str())),
    }
}

fn require_nonempty(key: EnvKey) -> Result<String, ConfigError> {
    match read_env_strict(key)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.as_str())),
    }
}

fn validate_bucket(bucket: String) -> Result<String, ConfigError> {
    let len_ok = (3..=63).contains(&bucket.len());
    let chars_ok = bucket.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if len_ok && chars_ok {
        Ok(bucket)
    } else {
        Err(ConfigError::Invalid {
            field: "S3_BUCKET",
            reason: "must be 3-63 chars of lowercase letters, digits, '-', '.'".to_string(),
        })
    }
}

fn validate_region(region: String) -> Result<String, ConfigError> {
    if region.is_empty() || region.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid {
            field: "S3_REGION",
            reason: "must be non-empty and contain no whitespace".to_string(),
        });
    }
    Ok(region)
}

/// Parses `scenario:pipeline_version:workflow_type:task_queue:progress_query`
/// entries, one per `;`-separated segment.
fn parse_scenario_overrides(raw: &str) -> Result<Vec<ScenarioOverride>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let parts: Vec<&str> = segment.split(':').collect();
            let [scenario, pipeline_version, workflow_type, task_queue, progress_query] = parts[..] else {
                return Err(ConfigError::Invalid {
                    field: "SCENARIO_VERSION_OVERRIDES",
                    reason: format!(
                        "expected 5 ':'-separated fields in `{segment}`, got {}",
                        parts.len()
                    ),
                });
            };
            Ok(ScenarioOverride {
                scenario: scenario.to_string(),
                pipeline_version: pipeline_version.to_string(),
                route: ScenarioRoute {
                    workflow_type: workflow_type.to_string(),
                    task_queue: task_queue.to_string(),
                    progress_query: progress_query.to_string(),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    #[test]
    fn rejects_invalid_bucket_chars() {
        assert!(validate_bucket("Has_Upper".to_string()).is_err());
        assert!(validate_bucket("ab".to_string()).is_err());
        assert!(validate_bucket("valid-bucket.name".to_string()).is_ok());
    }

    #[test]
    fn rejects_region_with_whitespace() {
        assert!(validate_region("us east 1".to_string()).is_err());
        assert!(validate_region(String::new()).is_err());
        assert!(validate_region("us-east-1".to_string()).is_ok());
    }

    #[test]
    fn parses_single_scenario_override() {
        let parsed = parse_scenario_overrides("ingest:2:ingest-2:point-cloud-task-queue-v2:progress").expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].scenario, "ingest");
        assert_eq!(parsed[0].pipeline_version, "2");
        assert_eq!(parsed[0].route.workflow_type, "ingest-2");
    }

    #[test]
    fn parses_multiple_semicolon_separated_overrides() {
        let parsed = parse_scenario_overrides(
            "ingest:2:ingest-2:queue-2:progress;ingest:3:ingest-3:queue-3:progress",
        )
        .expect("parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].pipeline_version, "3");
    }

    #[test]
    fn rejects_malformed_override_segment() {
        assert!(parse_scenario_overrides("ingest:2:only-three").is_err());
    }
}
