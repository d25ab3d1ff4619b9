//! Handler for the `find_tool` meta-tool.
//!
//! Keyword search over every indexed tool; returns names, descriptions and
//! input schemas so the agent knows exactly what to pass to `call_tool`.

use std::pin::Pin;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Value, json};

use crate::error::{OptimizerError, OptimizerResult};
use crate::tools::{ToolFactory, ToolHandler};

/// Handler for the `find_tool` meta-tool.
pub struct FindToolHandler {
    factory: ToolFactory,
}

impl FindToolHandler {
    pub fn new(factory: ToolFactory) -> Self {
        Self { factory }
    }

    fn schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));

        let mut properties = serde_json::Map::new();
        properties.insert(
            "query".to_string(),
            json!({
                "type": "string",
                "description": "What you want to do, e.g. \"get jira issue\" or \"send slack message\". Empty lists every tool."
            }),
        );
        properties.insert(
            "limit".to_string(),
            json!({
                "type": "integer",
                "description": "Maximum number of results (default: all matches).",
                "minimum": 1
            }),
        );

        schema.insert("properties".to_string(), json!(properties));
        schema.insert("required".to_string(), json!(["query"]));
        schema
    }

    /// `limit`, falling back to the `top_k` spelling. Must be a positive
    /// integer when present.
    fn limit(args: &JsonObject) -> OptimizerResult<Option<usize>> {
        let Some(raw) = args.get("limit").or_else(|| args.get("top_k")) else {
            return Ok(None);
        };
        if raw.is_null() {
            return Ok(None);
        }
        match raw.as_u64() {
            Some(0) | None => Err(OptimizerError::InvalidArguments(format!(
                "limit must be a positive integer, got {raw}"
            ))),
            Some(n) => Ok(Some(usize::try_from(n).unwrap_or(usize::MAX))),
        }
    }
}

impl ToolHandler for FindToolHandler {
    fn name(&self) -> &str {
        "find_tool"
    }

    fn title(&self) -> Option<&str> {
        Some("Find Tool")
    }

    fn description(&self) -> &str {
        "Search for tools relevant to the current task. ALWAYS call this before call_tool \
         when you need an external system or are unsure which tool to use. Returns matching \
         tool names, descriptions and input schemas."
    }

    fn input_schema(&self) -> JsonObject {
        self.schema()
    }

    fn execute(
        &self,
        args: JsonObject,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let query = args
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let limit = match Self::limit(&args) {
                Ok(limit) => limit,
                Err(e) => {
                    let payload = json!({ "error": e.to_string() });
                    return Ok(CallToolResult {
                        content: vec![Content::text(payload.to_string())],
                        structured_content: Some(payload),
                        is_error: Some(true),
                        meta: None,
                    });
                }
            };

            let tools = self.factory.find_tool(&query, limit);
            let no_matches = tools.is_empty();
            let mut payload = json!({
                "query": query,
                "count": tools.len(),
                "tools": tools,
            });
            if no_matches {
                payload["servers"] = json!(self.factory.registry().servers());
                payload["hint"] = json!("No tools matched. Try a broader search term.");
            }

            let text = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|_| "internal serialization error".to_string());

            Ok(CallToolResult {
                content: vec![Content::text(text)],
                structured_content: Some(payload),
                is_error: Some(false),
                meta: None,
            })
        })
    }
}
