//! Caller identity anonymization
//!
//! Identities (session ids, authorization headers, ip/user-agent composites)
//! never reach the database in clear text. They are reduced to a SHA-256 hex
//! digest so retention metrics can count distinct users without being able
//! to recover who they were.

use sha2::{Digest, Sha256};

/// Identity shared by every caller that presents no identity source at all
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Length of a rendered identity hash (hex-encoded SHA-256)
pub const HASH_LEN: usize = 64;

/// Hash a caller identity into a fixed-length opaque string
///
/// Deterministic across processes (no salt), so the same caller always maps
/// to the same `user_id_hash` row value.
pub fn hash_identifier(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    format!("{:x}", hasher.finalize())
}
