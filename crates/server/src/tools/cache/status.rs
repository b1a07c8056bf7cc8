//! cache_status tool implementation.

use mangashelf_client::Library;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Implementation of the cache_status tool.
pub async fn status_impl(library: &Library) -> Result<CallToolResult, McpError> {
    json_result(&library.status())
}
