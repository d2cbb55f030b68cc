//! Content fingerprints used to gate every write.
//!
//! A write (a gateway push, a resource upsert, a status update) only happens
//! when the fingerprint of the candidate content differs from the one that
//! was last recorded.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `payload`.
pub fn fingerprint(payload: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(payload.as_ref()))
}

/// Fingerprints the canonical JSON form of `value`.
///
/// Struct fields serialize in declaration order, so two logically equal
/// values always produce the same digest.
pub fn fingerprint_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_vec(value).map(fingerprint)
}

/// Returns true when `candidate` differs from the recorded checksum.
pub fn changed(recorded: Option<&str>, candidate: &str) -> bool {
    recorded != Some(candidate)
}
