//! manga_pages tool implementation.
//!
//! Returns one batch of page references for an opened archive.

use mangashelf_client::Library;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, parse_identity};

/// Input parameters for manga_pages tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MangaPagesParams {
    /// Identity returned by manga_open.
    pub identity: String,

    /// Zero-based index of the first page (default: 0). Clamped to the page count.
    #[serde(default)]
    pub offset: usize,

    /// Number of references to return (default: configured page size).
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Implementation of the manga_pages tool.
pub async fn pages_impl(library: &Library, params: MangaPagesParams) -> Result<CallToolResult, McpError> {
    let identity = parse_identity(&params.identity)?;
    let slice = library.fetch_page(&identity, params.offset, params.page_size).await?;
    json_result(&slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::library;
    use mangashelf_core::compute_identity;

    #[tokio::test]
    async fn test_pages_malformed_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let library = library(tmp.path()).await;

        let params = MangaPagesParams { identity: "../etc".into(), offset: 0, page_size: None };
        let err = pages_impl(&library, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_pages_not_opened() {
        let tmp = tempfile::tempdir().unwrap();
        let library = library(tmp.path()).await;

        let identity = compute_identity("https://example.com/vol1.zip").to_string();
        let params = MangaPagesParams { identity, offset: 0, page_size: None };
        let err = pages_impl(&library, params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }
}
