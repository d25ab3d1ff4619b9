//! Handler trait for the tools this server advertises, and the set that
//! holds them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use rmcp::model::{CallToolResult, JsonObject, Tool as McpTool};

/// Trait for handling MCP tool invocations.
///
/// Each advertised tool implements this trait to define its schema and
/// execution logic.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's name (e.g., "find_tool").
    fn name(&self) -> &str;

    /// Returns the tool's human-readable title.
    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str;

    fn input_schema(&self) -> JsonObject;

    /// Executes the tool with the given arguments.
    fn execute(
        &self,
        args: JsonObject,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>>;

    /// Converts this handler to an `McpTool` for use in `list_tools`.
    fn to_mcp_tool(&self) -> McpTool {
        let mut tool = McpTool::new(
            self.name().to_string(),
            self.description().to_string(),
            Arc::new(self.input_schema()),
        );
        tool.title = self.title().map(|s| s.to_string());
        tool
    }
}

/// Ordered set of handlers exposed to the host runtime.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A handler with the same name replaces the old one.
    pub fn register_handler<T: ToolHandler + 'static>(mut self, handler: T) -> Self {
        self.handlers.retain(|h| h.name() != handler.name());
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.name() == name).cloned()
    }

    /// All handlers as `McpTool`s, in registration order.
    pub fn list_tools(&self) -> Vec<McpTool> {
        self.handlers.iter().map(|h| h.to_mcp_tool()).collect()
    }

    /// Execute a handler by name.
    pub async fn call_tool(&self, name: &str, args: JsonObject) -> Result<CallToolResult> {
        let handler = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;
        handler.execute(args).await
    }
}
