//! Content-addressed keys for tracked URLs.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Compute the index key for a URL.
///
/// SHA-256 of the exact URL string, base64url encoded without padding.
/// The same string always yields the same key, so re-capturing a URL
/// lands on the same row.
pub fn fingerprint(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
