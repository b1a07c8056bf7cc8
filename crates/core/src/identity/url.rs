//! URL canonicalization and source policy checks.

use percent_encoding::percent_decode_str;

use super::ContentIdentity;
use crate::Error;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize a URL string for consistent identities and policy checks.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an explicit http:// or https:// scheme
/// 3. Require a host
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
/// 6. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingHost),
    };
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Validate a source URL against scheme and domain policy.
///
/// An empty allowlist permits every host. Otherwise the URL's host (or
/// `host:port` when a non-default port is present) must be listed.
/// Allowlist entries are expected in lowercase.
pub fn validate(input: &str, allowlist: &[String]) -> Result<url::Url, Error> {
    let url = canonicalize(input).inspect_err(|e| {
        tracing::warn!(url = %input.trim(), error = %e, "rejected source URL");
    })?;

    if allowlist.is_empty() {
        return Ok(url);
    }

    let host = url.host_str().unwrap_or_default();
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    if allowlist.iter().any(|allowed| allowed == host || *allowed == authority) {
        Ok(url)
    } else {
        tracing::warn!(url = %url, host = %authority, "source domain not in allowlist");
        Err(Error::DomainNotAllowed(authority))
    }
}

/// Characters stripped from derived titles.
const TITLE_FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Derive a display title from the last path segment of a URL.
///
/// The segment is percent-decoded, its extension removed, and path or shell
/// metacharacters stripped. Falls back to the identity's short prefix.
pub fn derive_title(url: &url::Url, identity: &ContentIdentity) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let decoded = percent_decode_str(segment).decode_utf8_lossy();

    let stem = match decoded.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => decoded.as_ref(),
    };

    let title: String = stem.chars().filter(|c| !TITLE_FORBIDDEN.contains(c)).collect();
    let title = title.trim();

    if title.is_empty() { identity.short().to_string() } else { title.to_string() }
}
