// lidar-control-core/src/hashing.rs
// ============================================================================
// Module: Canonical Hashing & Fingerprinting
// Description: Deterministic SHA-256 hashing over sorted, compact JSON.
// Purpose: Provide the ingest-run fingerprint and other content digests.
// Dependencies: serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! The ingest run fingerprint is the idempotency anchor for the whole
//! control plane: two runs over the same raw artifact set must hash
//! identically regardless of row insertion order. This module hashes a
//! projection of raw artifact fields, serialized with sorted object keys and
//! compact (`,`/`:`) separators.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Errors raised while computing a canonical hash.
#[derive(Debug, Error)]
pub enum HashError {
    /// Serialization to JSON failed.
    #[error("failed to serialize value for hashing: {0}")]
    Serialize(String),
}

/// One raw artifact's projected fingerprint fields, in fixed field order:
/// `(kind, bucket, key, etag, size_bytes)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FingerprintArtifact {
    /// Artifact kind (e.g. `raw.point_cloud`).
    pub kind: String,
    /// Object store bucket.
    pub bucket: String,
    /// Object store key.
    pub key: String,
    /// Object ETag, stripped of quotes.
    pub etag: String,
    /// Object size in bytes.
    pub size_bytes: i64,
}

/// Computes the hex-encoded SHA-256 fingerprint of a scan's raw artifact set.
///
/// Inputs are sorted by `(kind, bucket, key)` before serialization so that
/// reordering the input slice never changes the result, matching the
/// "fingerprint is a pure function of projected fields" property.
///
/// # Errors
///
/// Returns [`HashError::Serialize`] if canonical serialization fails (this
/// can only happen for non-finite floats, which this struct never contains).
pub fn compute_fingerprint(artifacts: &[FingerprintArtifact]) -> Result<String, HashError> {
    let mut sorted: Vec<&FingerprintArtifact> = artifacts.iter().collect();
    sorted.sort_by(|a, b| (&a.kind, &a.bucket, &a.key).cmp(&(&b.kind, &b.bucket, &b.key)));
    let bytes = canonical_compact_json(&sorted)?;
    Ok(hex_sha256(&bytes))
}

/// Serializes a value as JSON with sorted object keys and compact `,`/`:`
/// separators, recursively, so the digest is stable regardless of struct
/// field order or serializer whitespace choices.
fn canonical_compact_json<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    let value = serde_json::to_value(value).map_err(|err| HashError::Serialize(err.to_string()))?;
    let sorted = sort_json_keys(value);
    serde_json::to_vec(&sorted).map_err(|err| HashError::Serialize(err.to_string()))
}

/// Recursively sorts the keys of every JSON object in `value`.
fn sort_json_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                let v = map[key].clone();
                sorted.insert(key.clone(), sort_json_keys(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_json_keys).collect())
        }
        other => other,
    }
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    fn art(kind: &str, bucket: &str, key: &str, etag: &str, size: i64) -> FingerprintArtifact {
        FingerprintArtifact {
            kind: kind.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: etag.to_string(),
            size_bytes: size,
        }
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = art("raw.point_cloud", "b", "k1", "e1", 10);
        let b = art("raw.trajectory", "b", "k2", "e2", 20);
        let fp1 = compute_fingerprint(&[a.clone(), b.clone()]).expect("hash");
        let fp2 = compute_fingerprint(&[b, a]).expect("hash");
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn fingerprint_changes_with_any_projected_field() {
        let base = art("raw.point_cloud", "b", "k1", "e1", 10);
        let mut changed = base.clone();
        changed.etag = "different".to_string();
        let fp1 = compute_fingerprint(&[base]).expect("hash");
        let fp2 = compute_fingerprint(&[changed]).expect("hash");
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn fingerprint_is_deterministic_hex_sha256() {
        let fp = compute_fingerprint(&[]).expect("hash");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest::proptest! {
        #[test]
        fn fingerprint_is_stable_under_any_permutation(
            artifacts in proptest::collection::vec(
                (
                    "raw\\.(point_cloud|trajectory|control_point)",
                    "[a-z0-9-]{1,8}",
                    "[a-z0-9/_.-]{1,16}",
                    "[a-f0-9]{8,32}",
                    0i64..1_000_000,
                ).prop_map(|(kind, bucket, key, etag, size_bytes)| FingerprintArtifact { kind, bucket, key, etag, size_bytes }),
                0..8,
            ),
            seed in 0u64..1000,
        ) {
            let mut shuffled = artifacts.clone();
            // Deterministic pseudo-shuffle keyed on `seed`, so the property
            // holds for every reordering proptest happens to generate.
            for i in (1..shuffled.len()).rev() {
                let j = (seed as usize).wrapping_add(i).wrapping_mul(2654435761) % (i + 1);
                shuffled.swap(i, j);
            }
            let original = compute_fingerprint(&artifacts).expect("hash");
            let reordered = compute_fingerprint(&shuffled).expect("hash");
            proptest::prop_assert_eq!(original, reordered);
        }

        #[test]
        fn fingerprint_changes_when_any_field_differs(
            kind in "raw\\.point_cloud",
            bucket in "[a-z0-9-]{1,8}",
            key in "[a-z0-9/_.-]{1,16}",
            etag in "[a-f0-9]{8,32}",
            size_bytes in 0i64..1_000_000,
            size_delta in 1i64..100,
        ) {
            let base = FingerprintArtifact { kind, bucket, key, etag, size_bytes };
            let mut changed = base.clone();
            changed.size_bytes += size_delta;
            let fp1 = compute_fingerprint(&[base]).expect("hash");
            let fp2 = compute_fingerprint(&[changed]).expect("hash");
            proptest::prop_assert_ne!(fp1, fp2);
        }
    }
}
