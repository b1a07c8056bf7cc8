//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

use super::ContentIdentity;
use super::url::canonicalize;

/// Compute the content identity for a source URL.
///
/// The URL is canonicalized first, so trivially different spellings of the
/// same resource (host case, fragment, surrounding whitespace) share an
/// identity. Input that does not parse as a URL is hashed as trimmed text.
pub fn compute_identity(url: &str) -> ContentIdentity {
    match canonicalize(url) {
        Ok(canonical) => digest(canonical.as_str()),
        Err(_) => digest(url.trim()),
    }
}

fn digest(normalized: &str) -> ContentIdentity {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    ContentIdentity(hex::encode(hasher.finalize()))
}
