//! MCP server implementation using rmcp.
//!
//! Advertises exactly the two meta-tools and forwards `tools/call` to them.
//! Serves over stdio or streamable HTTP.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use tower_http::trace::TraceLayer;

use crate::registry::ToolRegistry;
use crate::tools::HandlerRegistry;

/// MCP server that delegates tool calls to the meta-tool handlers.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    handlers: Arc<HandlerRegistry>,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { registry, handlers }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    fn instructions(&self) -> String {
        format!(
            "Tool optimizer: every backend tool is reached through `find_tool` and `call_tool`.\n\n{}",
            self.registry.summary_for_prompt()
        )
    }
}

impl ServerHandler for McpServer {
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let result = ListToolsResult {
            tools: self.handlers.list_tools(),
            next_cursor: None,
            ..Default::default()
        };
        std::future::ready(Ok(result))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();
        let handlers = self.handlers.clone();

        async move {
            match handlers.call_tool(&tool_name, args).await {
                Ok(result) => Ok(result),
                Err(e) => Err(McpError::invalid_params(
                    format!("Tool execution failed: {}", e),
                    None,
                )),
            }
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(self.instructions()),
        }
    }
}

/// Serve the meta-tools as an MCP Streamable HTTP server.
///
/// The MCP endpoint is mounted at `/mcp` on `bind`, e.g. `127.0.0.1:3942`.
pub async fn start_mcp_http(server: McpServer, bind: &str) -> Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = Router::new()
        .nest_service("/mcp", service)
        .layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!("MCP HTTP server listening on http://{}/mcp", bind);

    axum::serve(listener, router).await?;

    Ok(())
}
