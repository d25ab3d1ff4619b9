//! The session capability the registry depends on.
//!
//! A session is a live connection to one tool-providing server. The registry
//! only ever borrows sessions; whoever started them owns their lifetime.

use anyhow::Result;
use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject};

/// A tool as enumerated by a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: JsonObject,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonObject,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Connected session exposing `list_tools` and `invoke_tool`.
///
/// Implementations must be safe to call concurrently; if the backing server
/// cannot handle parallel calls, the implementation serializes them itself.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Server name used for logging, grouping and optional name prefixing.
    fn server_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke `name` with `arguments` and return the raw transport response.
    async fn invoke_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult>;
}
