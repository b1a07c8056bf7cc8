//! Unified error types for mangashelf.
//!
//! The collaborator layer only ever sees this closed set of kinds; raw
//! OS and library errors are folded into a message string.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the mangashelf cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a malformed identity).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL is malformed, not http(s), or has no host.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// URL host is not in the configured allowlist.
    #[error("DOMAIN_NOT_ALLOWED: {0}")]
    DomainNotAllowed(String),

    /// URL does not name one of the supported archive kinds.
    #[error("UNSUPPORTED_FORMAT: {0}")]
    UnsupportedFormat(String),

    /// Network failure, timeout, or non-2xx status while downloading.
    #[error("TRANSFER_ERROR: {0}")]
    Transfer(String),

    /// Download exceeded the configured byte cap.
    #[error("SIZE_EXCEEDED: {0}")]
    SizeExceeded(String),

    /// Archive container could not be read.
    #[error("CORRUPT_ARCHIVE: {0}")]
    CorruptArchive(String),

    /// Extraction produced zero pages.
    #[error("NO_IMAGES_FOUND: {0}")]
    NoImagesFound(String),

    /// External unpack program missing, failing, or timed out.
    #[error("TOOL_UNAVAILABLE: {0}")]
    ToolUnavailable(String),

    /// No materialized cache entry (or page) for the request.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Local filesystem operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// Catalog database operation failed.
    #[error("CATALOG_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CATALOG_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::DomainNotAllowed(_) => "DOMAIN_NOT_ALLOWED",
            Error::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Error::Transfer(_) => "TRANSFER_ERROR",
            Error::SizeExceeded(_) => "SIZE_EXCEEDED",
            Error::CorruptArchive(_) => "CORRUPT_ARCHIVE",
            Error::NoImagesFound(_) => "NO_IMAGES_FOUND",
            Error::ToolUnavailable(_) => "TOOL_UNAVAILABLE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Database(_) | Error::MigrationFailed(_) => "CATALOG_ERROR",
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transfer(_) | Error::ToolUnavailable(_) | Error::Storage(_))
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn storage(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::Storage(format!("{context}: {err}"))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::DomainNotAllowed(msg) => (-32004, msg.clone()),
            Error::UnsupportedFormat(msg) => (-32005, msg.clone()),
            Error::Transfer(msg) => (-32006, msg.clone()),
            Error::SizeExceeded(msg) => (-32007, msg.clone()),
            Error::CorruptArchive(msg) => (-32008, msg.clone()),
            Error::NoImagesFound(msg) => (-32009, msg.clone()),
            Error::ToolUnavailable(msg) => (-32010, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Storage(msg) => (-32011, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: format!("{}: {message}", err.code()).into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SizeExceeded("600 bytes exceeds 500".to_string());
        assert!(err.to_string().starts_with("SIZE_EXCEEDED"));
        assert!(err.to_string().contains("600 bytes"));
    }

    #[test]
    fn test_error_code_matches_display_prefix() {
        let errors = [
            Error::InvalidUrl("x".into()),
            Error::DomainNotAllowed("x".into()),
            Error::CorruptArchive("x".into()),
            Error::NoImagesFound("x".into()),
            Error::ToolUnavailable("x".into()),
            Error::NotFound("x".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(err.code()), "{err}");
        }
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::Transfer("reset".into()).is_retryable());
        assert!(Error::ToolUnavailable("unrar missing".into()).is_retryable());
        assert!(!Error::SizeExceeded("big".into()).is_retryable());
        assert!(!Error::InvalidUrl("bad".into()).is_retryable());
        assert!(!Error::CorruptArchive("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NotFound("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
        assert!(mcp_err.message.contains("NOT_FOUND"));
    }
}
