//! manga_open tool implementation.
//!
//! Prepares an archive for reading: validates the URL, downloads and
//! extracts it unless already cached, and reports the page count. A known
//! identity can be reopened instead of passing its URL again.

use mangashelf_client::{Library, ReadyEntry};
use mangashelf_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, parse_identity};

/// Input parameters for manga_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MangaOpenParams {
    /// Archive URL ending in .zip, .cbz, .rar or .cbr.
    #[serde(default)]
    pub url: Option<String>,

    /// Identity returned by an earlier manga_open, to reopen without the URL.
    #[serde(default)]
    pub identity: Option<String>,
}

/// Output structure for manga_open tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MangaOpenOutput {
    #[serde(flatten)]
    pub entry: ReadyEntry,
    /// Page references returned per manga_pages call by default.
    pub page_size: usize,
}

/// Implementation of the manga_open tool.
pub async fn open_impl(library: &Library, params: MangaOpenParams) -> Result<CallToolResult, McpError> {
    let entry = match (params.url.as_deref(), params.identity.as_deref()) {
        (Some(url), None) => library.ensure_ready(url).await?,
        (None, Some(identity)) => library.reopen(&parse_identity(identity)?).await?,
        _ => return Err(Error::InvalidInput("exactly one of url or identity must be specified".into()).into()),
    };

    json_result(&MangaOpenOutput { entry, page_size: library.config().page_size })
}
