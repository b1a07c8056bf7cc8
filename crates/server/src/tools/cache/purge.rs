//! cache_purge tool implementation.
//!
//! Removes every cached archive and extracted page. The library catalog is
//! kept so purged entries can be reopened.

use mangashelf_client::Library;
use mangashelf_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Must be true; guards against accidental purges.
    #[serde(default)]
    pub confirm: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries removed.
    pub deleted: usize,
    /// Bytes released.
    pub freed_bytes: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(library: &Library, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if !params.confirm {
        return Err(Error::InvalidInput("confirm must be true to purge the cache".to_string()).into());
    }

    let before = library.status();
    library.purge().await?;
    tracing::info!(deleted = before.entries.len(), freed_bytes = before.total_bytes, "cache purged");

    json_result(&CachePurgeOutput { deleted: before.entries.len(), freed_bytes: before.total_bytes })
}
