//! Time-boxed sync tokens and random token material.
//!
//! The derived token is `hex(sha256(secret || bucket))` where `bucket` is the
//! decimal value of `floor(unix_time / interval)`. Only the current bucket is
//! accepted.

use super::credentials::{SharedSecret, constant_time_eq};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default token validity window in seconds.
pub const DEFAULT_TOKEN_INTERVAL_SECS: u64 = 300;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Bucket index for a point in time. A zero interval is treated as one second.
pub fn time_bucket(unix_secs: u64, interval_secs: u64) -> u64 {
    unix_secs / interval_secs.max(1)
}

/// Hex-encoded SHA-256 of arbitrary input.
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(input.as_ref()))
}

/// Derives the token for one bucket.
///
/// ```rust
/// use dbsync_core::security::{SharedSecret, derive_token};
///
/// let secret = SharedSecret::new("s");
/// assert_eq!(derive_token(&secret, 7).len(), 64);
/// assert_ne!(derive_token(&secret, 7), derive_token(&secret, 8));
/// ```
pub fn derive_token(secret: &SharedSecret, bucket: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.expose().as_bytes());
    hasher.update(bucket.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Token for the bucket containing `now`.
pub fn current_token(secret: &SharedSecret, interval_secs: u64) -> String {
    derive_token(secret, time_bucket(unix_now(), interval_secs))
}

/// Checks a presented token against the bucket containing `unix_secs`.
pub fn verify_token_at(
    secret: &SharedSecret,
    presented: &str,
    interval_secs: u64,
    unix_secs: u64,
) -> bool {
    if secret.is_empty() {
        return false;
    }
    let expected = derive_token(secret, time_bucket(unix_secs, interval_secs));
    constant_time_eq(expected.as_bytes(), presented.trim().as_bytes())
}

/// Hex string of `bytes` random bytes (at most 32).
pub fn random_hex(bytes: usize) -> String {
    let material: [u8; 32] = rand::random();
    hex::encode(&material[..bytes.min(material.len())])
}
