//! MCP server over stdio.
//!
//! Stdout carries JSON-RPC frames, so nothing here may print to it; all
//! diagnostics go through `tracing`, which `main` routes to stderr.
//!
//! # Client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "rag-server": {
//!       "command": "nbrag",
//!       "args": ["--config", "/path/to/nbrag.toml", "serve", "mcp"]
//!     }
//!   }
//! }
//! ```

use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;

use crate::config::Config;
use crate::generate::{GeminiGenerator, TextGenerator};
use crate::http::GoogleClient;
use crate::mcp::McpBridge;
use crate::search::{DiscoverySearchBackend, SearchBackend};
use crate::tools::{ToolContext, ToolRegistry};

/// Build the gateways from `config` and serve the built-in tools until the
/// client disconnects.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let client = GoogleClient::from_config(config)?;
    let search: Arc<dyn SearchBackend> =
        Arc::new(DiscoverySearchBackend::from_config(client.clone(), config)?);
    let generator: Arc<dyn TextGenerator> =
        Arc::new(GeminiGenerator::from_config(client, config)?);

    let ctx = ToolContext::from_backends(search, generator, config);
    run_server_with(Arc::new(ToolRegistry::with_builtins()), Arc::new(ctx)).await
}

/// Serve an explicit registry and context over stdio.
pub async fn run_server_with(tools: Arc<ToolRegistry>, ctx: Arc<ToolContext>) -> anyhow::Result<()> {
    for t in tools.tools() {
        tracing::info!(tool = t.name(), "registered tool");
    }

    let service = McpBridge::new(tools, ctx)
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;

    service.waiting().await?;
    tracing::info!("client disconnected");
    Ok(())
}
