// lidar-control-core/src/ids.rs
// ============================================================================
// Module: Control Plane Identifiers
// Description: Canonical opaque identifiers for catalog and run entities.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, ulid
// ============================================================================

//! ## Overview
//! Identifiers are opaque wrappers; validation of their contents (ULID
//! well-formedness, non-empty strings) happens at construction, not on every
//! read. Display forms are the canonical wire representation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use ulid::Ulid;

/// Tenant identifier (a "Company" in the catalog).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    /// Creates a new company identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CompanyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CompanyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// CRS identifier. Immutable once created; globally unique.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrsId(String);

impl CrsId {
    /// Creates a new CRS identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CrsId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Macro implementing a ULID-backed identifier newtype.
macro_rules! ulid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Mints a new identifier from a fresh ULID.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Wraps an existing ULID value.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn ulid(&self) -> Ulid {
                self.0
            }

            /// Parses an identifier from its canonical string form.
            ///
            /// # Errors
            ///
            /// Returns an error when `value` is not a well-formed ULID.
            pub fn parse(value: &str) -> Result<Self, ulid::DecodeError> {
                Ok(Self(Ulid::from_string(value)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

ulid_id!(DatasetId, "Dataset identifier (ULID).");
ulid_id!(DatasetVersionId, "DatasetVersion identifier (ULID).");
ulid_id!(ScanId, "Scan identifier (ULID).");

/// Artifact identifier (autoincrement in the catalog, so a plain integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(i64);

impl ArtifactId {
    /// Wraps a raw artifact row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ingest run identifier (autoincrement in the catalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestRunId(i64);

impl IngestRunId {
    /// Wraps a raw ingest run row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for IngestRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Workflow identifier, supplied by the caller and used for idempotency and
/// correlation across the status store, the event bus, and the workflow
/// engine gateway.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Creates a new workflow identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WorkflowIdError::Empty);
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors raised when constructing a [`WorkflowId`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowIdError {
    /// The supplied workflow id was empty or whitespace-only.
    #[error("workflow_id must not be empty")]
    Empty,
}
