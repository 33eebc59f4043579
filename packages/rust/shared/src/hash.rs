//! Stable hashing: normalization + SHA-256 used to detect duplicate content
//! and derive deterministic file names.

use sha2::{Digest, Sha256};

/// Length of the short hash used in derived file names.
pub const SHORT_HASH_LEN: usize = 12;

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-insensitive content hash.
pub fn stable_hash(text: &str) -> String {
    sha256_hex(normalize_whitespace(text).as_bytes())
}

/// First [`SHORT_HASH_LEN`] hex characters of [`stable_hash`].
pub fn short_hash(text: &str) -> String {
    let mut hash = stable_hash(text);
    hash.truncate(SHORT_HASH_LEN);
    hash
}
