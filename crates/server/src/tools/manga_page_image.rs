//! manga_page_image tool implementation.
//!
//! Returns a single normalized page as base64 PNG image content.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mangashelf_client::Library;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::parse_identity;

/// Input parameters for manga_page_image tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MangaPageImageParams {
    /// Identity returned by manga_open.
    pub identity: String,

    /// Zero-based page index.
    pub index: usize,
}

/// Implementation of the manga_page_image tool.
pub async fn page_image_impl(library: &Library, params: MangaPageImageParams) -> Result<CallToolResult, McpError> {
    let identity = parse_identity(&params.identity)?;
    let bytes = library.read_page(&identity, params.index).await?;

    tracing::debug!(identity = %identity, index = params.index, bytes = bytes.len(), "serving page image");
    Ok(CallToolResult::success(vec![Content::image(STANDARD.encode(bytes), "image/png")]))
}
