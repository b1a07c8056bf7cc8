//! manga_library tool implementation.
//!
//! Lists every archive ever opened, whether or not it is still cached.

use mangashelf_client::Library;
use mangashelf_core::SourceRecord;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LibraryItem {
    #[serde(flatten)]
    pub source: SourceRecord,
    /// Whether pages are on disk right now; otherwise manga_open re-downloads.
    pub cached: bool,
}

/// Output from the manga_library tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MangaLibraryOutput {
    pub items: Vec<LibraryItem>,
}

/// Implementation of the manga_library tool.
pub async fn library_impl(library: &Library) -> Result<CallToolResult, McpError> {
    let cached: Vec<_> = library.status().entries.into_iter().map(|e| e.identity).collect();
    let items = library
        .sources()
        .await?
        .into_iter()
        .map(|source| LibraryItem { cached: cached.contains(&source.identity), source })
        .collect();

    json_result(&MangaLibraryOutput { items })
}
