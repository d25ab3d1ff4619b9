//! Handler for the `call_tool` meta-tool.
//!
//! Execute a previously discovered backend tool by its exact name.

use std::pin::Pin;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Value, json};

use crate::tools::{CallOutcome, ToolFactory, ToolHandler};

/// Handler for the `call_tool` meta-tool.
pub struct CallToolHandler {
    factory: ToolFactory,
}

impl CallToolHandler {
    pub fn new(factory: ToolFactory) -> Self {
        Self { factory }
    }

    fn schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));

        let mut properties = serde_json::Map::new();
        properties.insert(
            "tool_name".to_string(),
            json!({
                "type": "string",
                "description": "Exact tool name as returned by find_tool (e.g. 'jira_get_issue')."
            }),
        );
        properties.insert(
            "arguments".to_string(),
            json!({
                "type": ["object", "string"],
                "description": "Arguments for the tool, shaped according to its input schema. \
                                An object, or a JSON string of one. Use {} for tools without arguments.",
                "additionalProperties": true
            }),
        );

        schema.insert("properties".to_string(), json!(properties));
        schema.insert("required".to_string(), json!(["tool_name"]));
        schema
    }
}

/// Wrap a dispatch outcome for the MCP response.
fn to_call_result(outcome: &CallOutcome) -> CallToolResult {
    let payload = outcome.to_json();
    let text = match &payload {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)
            .unwrap_or_else(|_| "internal serialization error".to_string()),
    };
    // structured content must be an object
    let structured_content = payload.is_object().then_some(payload);

    CallToolResult {
        content: vec![Content::text(text)],
        structured_content,
        is_error: Some(outcome.is_error()),
        meta: None,
    }
}

impl ToolHandler for CallToolHandler {
    fn name(&self) -> &str {
        "call_tool"
    }

    fn title(&self) -> Option<&str> {
        Some("Call Tool")
    }

    fn description(&self) -> &str {
        "Execute a tool by its exact name. Always call find_tool first to get the exact \
         name and input schema. On a ToolNotFoundError, run find_tool again."
    }

    fn input_schema(&self) -> JsonObject {
        self.schema()
    }

    fn execute(
        &self,
        args: JsonObject,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let tool_name = args
                .get("tool_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = args.get("arguments").cloned().unwrap_or(Value::Null);

            let outcome = self.factory.call_tool(&tool_name, arguments).await;
            Ok(to_call_result(&outcome))
        })
    }
}
