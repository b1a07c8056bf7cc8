//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    MangaOpenParams, MangaPageImageParams, MangaPagesParams,
    cache::{CachePurgeParams, purge_impl, status_impl},
    manga_library::library_impl,
    manga_open::open_impl,
    manga_page_image::page_image_impl,
    manga_pages::pages_impl,
};

use mangashelf_client::Library;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for mangashelf.
#[derive(Clone)]
pub struct MangaServer {
    library: Arc<Library>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl MangaServer {
    /// Create a new server handler over an opened library.
    pub fn new(library: Arc<Library>) -> Self {
        Self { library, tool_router: Self::tool_router() }
    }

    /// Prepare an archive for reading.
    ///
    /// Downloads and extracts on first use; later calls are served from the cache.
    #[tool(
        description = "Open a manga/comic archive (.zip, .cbz, .rar, .cbr) by URL, or reopen a known identity. Returns the identity, title and total page count."
    )]
    async fn manga_open(&self, params: Parameters<MangaOpenParams>) -> Result<CallToolResult, McpError> {
        open_impl(&self.library, params.0).await
    }

    #[tool(
        description = "List page references of an opened archive in reading order, starting at offset. Past the end returns an empty list."
    )]
    async fn manga_pages(&self, params: Parameters<MangaPagesParams>) -> Result<CallToolResult, McpError> {
        pages_impl(&self.library, params.0).await
    }

    #[tool(description = "Fetch one page of an opened archive as a PNG image.")]
    async fn manga_page_image(&self, params: Parameters<MangaPageImageParams>) -> Result<CallToolResult, McpError> {
        page_image_impl(&self.library, params.0).await
    }

    #[tool(description = "List every archive opened so far and whether it is currently cached.")]
    async fn manga_library(&self) -> Result<CallToolResult, McpError> {
        library_impl(&self.library).await
    }

    #[tool(description = "Report cache size, limit and entries, most recently read first.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.library).await
    }

    #[tool(description = "Delete every cached archive and page. Requires confirm=true. The library list is kept.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.library, params.0).await
    }
}

impl ServerHandler for MangaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mangashelf".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Call manga_open with an archive URL, then page through it with manga_pages or manga_page_image."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
