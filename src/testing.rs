//! In-memory sessions and transports for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::ServiceExt;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{CallToolResult, Content, JsonObject};
use rmcp::service::{RoleClient, RunningService as RmcpRunningService};
use serde_json::{Value, json};

use crate::session::{ToolDescriptor, ToolSession};

/// Scripted session: fixed tool list, canned responses, recorded calls.
pub struct FakeSession {
    name: String,
    tools: Vec<ToolDescriptor>,
    list_error: Option<String>,
    invoke_error: Option<String>,
    hanging_tool: Option<String>,
    responses: HashMap<String, CallToolResult>,
    calls: Mutex<Vec<(String, JsonObject)>>,
}

impl FakeSession {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            list_error: None,
            invoke_error: None,
            hanging_tool: None,
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tool(self, name: &str, description: &str) -> Self {
        self.with_schema_tool(name, description, JsonObject::new())
    }

    pub fn with_schema_tool(mut self, name: &str, description: &str, schema: JsonObject) -> Self {
        self.tools.push(ToolDescriptor::new(name, description, schema));
        self
    }

    pub fn with_response(mut self, tool: &str, response: CallToolResult) -> Self {
        self.responses.insert(tool.to_string(), response);
        self
    }

    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    pub fn failing_invoke(mut self, message: &str) -> Self {
        self.invoke_error = Some(message.to_string());
        self
    }

    /// Invocations of `tool` never complete.
    pub fn hanging_invoke(mut self, tool: &str) -> Self {
        self.hanging_tool = Some(tool.to_string());
        self
    }

    pub fn into_dyn(self) -> Arc<dyn ToolSession> {
        Arc::new(self)
    }

    /// Every `(name, arguments)` pair this session was invoked with.
    pub fn calls(&self) -> Vec<(String, JsonObject)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        match &self.list_error {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(self.tools.clone()),
        }
    }

    async fn invoke_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult> {
        self.calls.lock().push((name.to_string(), arguments.clone()));
        if let Some(msg) = &self.invoke_error {
            return Err(anyhow!("{msg}"));
        }
        if self.hanging_tool.as_deref() == Some(name) {
            std::future::pending::<()>().await;
        }
        if let Some(response) = self.responses.get(name) {
            return Ok(response.clone());
        }
        Ok(structured(json!({ "tool": name, "arguments": Value::Object(arguments) })))
    }
}

/// A successful response carrying `value` as structured content.
pub fn structured(value: Value) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(value.to_string())],
        structured_content: Some(value),
        is_error: Some(false),
        meta: None,
    }
}

/// A response with text blocks only.
pub fn text(blocks: &[&str], is_error: bool) -> CallToolResult {
    CallToolResult {
        content: blocks.iter().map(|b| Content::text(b.to_string())).collect(),
        structured_content: None,
        is_error: Some(is_error),
        meta: None,
    }
}

/// Serve `server` over an in-memory duplex pipe and return a connected client.
pub async fn connect_in_memory<S>(server: S) -> RmcpRunningService<RoleClient, ()>
where
    S: ServerHandler + 'static,
{
    let (client_stream, server_stream) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_stream);
    let (client_read, client_write) = tokio::io::split(client_stream);

    tokio::spawn(async move {
        let running = server.serve((server_read, server_write)).await?;
        running.waiting().await?;
        anyhow::Ok(())
    });

    ().serve((client_read, client_write))
        .await
        .expect("client handshake")
}
