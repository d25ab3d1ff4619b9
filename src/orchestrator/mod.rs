//! Startup wiring: start the configured MCP services, index their tools and
//! hand out the meta-tools.
//!
//! The orchestrator owns the sessions. The registry only holds weak handles,
//! so the orchestrator must outlive whatever serves the meta-tools.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::McpServiceConfig;
use crate::error::OptimizerError;
use crate::registry::{RegistryOptions, ToolRegistry};
use crate::server::McpServer;
use crate::session::ToolSession;
use crate::tools::ToolFactory;

/// Outcome of indexing a batch of sessions.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub servers_indexed: usize,
    pub tools_indexed: usize,
    /// One `ConnectionError` per session that could not be enumerated.
    pub failures: Vec<OptimizerError>,
}

/// Index every session, continuing past failures.
pub async fn index_sessions(
    registry: &ToolRegistry,
    sessions: &[Arc<dyn ToolSession>],
) -> IndexReport {
    let mut report = IndexReport::default();

    for session in sessions {
        match registry.index(session).await {
            Ok(count) => {
                report.servers_indexed += 1;
                report.tools_indexed += count;
            }
            Err(e) => {
                error!("Failed to index `{}`: {}", session.server_name(), e);
                report.failures.push(e);
            }
        }
    }

    report
}

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    sessions: Vec<Arc<dyn ToolSession>>,
    report: IndexReport,
}

impl Orchestrator {
    /// Start every enabled service and index its tools.
    ///
    /// Services that fail to start or to list their tools are logged and
    /// skipped. An empty registry is served, not treated as fatal.
    pub async fn connect(services: &[McpServiceConfig], options: RegistryOptions) -> Self {
        let mut sessions: Vec<Arc<dyn ToolSession>> = Vec::new();

        for service_config in services {
            match crate::mcp_client::start_service(service_config).await {
                Ok(Some(running)) => sessions.push(Arc::new(running)),
                Ok(None) => continue,
                Err(e) => error!("Failed to start service `{}`: {:#}", service_config.id(), e),
            }
        }

        Self::from_sessions(sessions, options).await
    }

    /// Build the registry from already-connected sessions.
    pub async fn from_sessions(
        sessions: Vec<Arc<dyn ToolSession>>,
        options: RegistryOptions,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::with_options(options));
        let report = index_sessions(&registry, &sessions).await;

        if registry.is_empty() {
            warn!("No tools were indexed; find_tool will return nothing");
        } else {
            info!(
                servers = report.servers_indexed,
                tools = report.tools_indexed,
                "Tool registry ready"
            );
        }

        Self {
            registry,
            sessions,
            report,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn report(&self) -> &IndexReport {
        &self.report
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn factory(&self) -> ToolFactory {
        ToolFactory::new(self.registry.clone())
    }

    /// MCP server exposing `find_tool` and `call_tool`.
    pub fn server(&self) -> McpServer {
        let handlers = Arc::new(self.factory().handlers());
        McpServer::new(self.registry.clone(), handlers)
    }
}
