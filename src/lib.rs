// Core modules
mod config;
mod error;
mod mcp_client;
mod registry;
mod session;

mod orchestrator;
mod tools;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export key types and functions
pub use config::{McpServiceConfig, load_mcp_services, parse_mcp_services, resolve_mcp_json_path};
pub use error::{OptimizerError, OptimizerResult};
pub use mcp_client::{RunningService, start_service};
pub use registry::{RegistryOptions, ToolRecord, ToolRegistry, ToolSummary};
pub use session::{ToolDescriptor, ToolSession};

pub use orchestrator::{IndexReport, Orchestrator, index_sessions};
pub use tools::{
    CallOutcome, CallToolHandler, FindToolHandler, HandlerRegistry, ToolFactory, ToolHandler,
    extract_output,
};
pub use server::McpServer;

use anyhow::Result;
use std::path::Path;

/// Convenience function: load `mcp.json`, connect every enabled server and
/// index its tools.
///
/// The returned `Orchestrator` owns the sessions; keep it alive for as long
/// as the meta-tools are served.
pub async fn bootstrap(config_path: Option<&Path>, options: RegistryOptions) -> Result<Orchestrator> {
    let services = load_mcp_services(config_path)?;
    tracing::info!("Loaded {} MCP service definitions", services.len());
    Ok(Orchestrator::connect(&services, options).await)
}
