//! Content identity and source URL validation.
//!
//! A [`ContentIdentity`] is the SHA-256 of the canonical URL, hex encoded.
//! Every on-disk artifact for a source is named with its identity as a
//! prefix, so the identity is also the grouping key for eviction.

pub mod hash;
pub mod url;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

pub use hash::compute_identity;
pub use url::{UrlError, canonicalize, derive_title, validate};

/// Length of the hex-encoded identity.
pub const IDENTITY_LEN: usize = 64;

/// Deterministic fingerprint of a source URL used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Parse an identity from the leading characters of a cache file name.
    ///
    /// Accepts `<identity>`, `<identity>.<ext>` and `<identity>_<suffix>`;
    /// returns `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let prefix = name.get(..IDENTITY_LEN)?;
        if !is_identity(prefix) {
            return None;
        }
        match name.as_bytes().get(IDENTITY_LEN) {
            None | Some(b'.') | Some(b'_') => Some(Self(prefix.to_string())),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for titles and log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

fn is_identity(s: &str) -> bool {
    s.len() == IDENTITY_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl FromStr for ContentIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if is_identity(&s) {
            Ok(Self(s))
        } else {
            Err(Error::InvalidInput(format!("not a content identity: {s:?}")))
        }
    }
}

impl TryFrom<String> for ContentIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentIdentity> for String {
    fn from(id: ContentIdentity) -> Self {
        id.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let id = compute_identity("https://example.com/a.zip");
        let parsed: ContentIdentity = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_uppercase_is_normalized() {
        let id = compute_identity("https://example.com/a.zip");
        let parsed: ContentIdentity = id.as_str().to_uppercase().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<ContentIdentity>().is_err());
        assert!("../../etc/passwd".parse::<ContentIdentity>().is_err());
        assert!("g".repeat(64).parse::<ContentIdentity>().is_err());
    }

    #[test]
    fn test_from_file_name() {
        let id = compute_identity("https://example.com/a.cbz");
        let archive = format!("{id}.cbz");
        let extracted = format!("{id}_extracted");

        assert_eq!(ContentIdentity::from_file_name(&archive), Some(id.clone()));
        assert_eq!(ContentIdentity::from_file_name(&extracted), Some(id.clone()));
        assert_eq!(ContentIdentity::from_file_name(id.as_str()), Some(id.clone()));
        assert_eq!(ContentIdentity::from_file_name(&format!("{id}0")), None);
        assert_eq!(ContentIdentity::from_file_name("README.md"), None);
        assert_eq!(ContentIdentity::from_file_name(".tmp"), None);
    }

    #[test]
    fn test_short() {
        let id = compute_identity("https://example.com/a.zip");
        assert_eq!(id.short().len(), 8);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<ContentIdentity, _> = serde_json::from_str("\"nope\"");
        assert!(result.is_err());
    }
}
