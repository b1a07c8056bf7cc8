//! mangashelf server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use mangashelf_client::Library;
use mangashelf_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        cache_dir = %config.cache_dir.display(),
        limit_bytes = config.cache_limit_bytes,
        allowlist = ?config.allowlist_domains,
        "Starting mangashelf server on stdio transport"
    );

    let library = Library::open(config).await.context("failed to open library")?;

    let handler = handler::MangaServer::new(Arc::new(library));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
