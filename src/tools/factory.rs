//! Builds the two meta-tools, `find_tool` and `call_tool`, over a registry.
//!
//! Neither operation ever fails outward: lookups return an empty list and
//! dispatch failures come back as a structured `CallOutcome::Failure`.

use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject};
use serde_json::{Value, json};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::{OptimizerError, OptimizerResult};
use crate::registry::{ToolRegistry, ToolSummary};
use crate::tools::handler::HandlerRegistry;
use crate::tools::{CallToolHandler, FindToolHandler};

/// Number of "did you mean" names attached to a not-found error.
const SUGGESTION_LIMIT: usize = 3;

/// Result of a `call_tool` dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The tool's unwrapped output.
    Success(Value),
    Failure {
        error: OptimizerError,
        suggestions: Vec<String>,
    },
}

impl CallOutcome {
    fn failure(error: OptimizerError) -> Self {
        Self::Failure {
            error,
            suggestions: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The error, if this is a failure.
    pub fn error(&self) -> Option<&OptimizerError> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Payload handed back to the agent: the output itself, or
    /// `{"error": "...", "suggestions": [...]}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Failure { error, suggestions } => {
                let mut payload = json!({ "error": error.to_string() });
                if !suggestions.is_empty() {
                    payload["suggestions"] = json!(suggestions);
                }
                payload
            }
        }
    }
}

/// Factory for the agent-facing meta-tools.
#[derive(Clone)]
pub struct ToolFactory {
    registry: Arc<ToolRegistry>,
}

impl ToolFactory {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Search the registry and summarize the hits. An empty query lists
    /// every registered tool.
    pub fn find_tool(&self, query: &str, limit: Option<usize>) -> Vec<ToolSummary> {
        let records = match limit {
            Some(limit) => self.registry.search_top(query, limit),
            None => self.registry.search(query),
        };
        debug!(query = %query, hits = records.len(), "find_tool");
        records
            .iter()
            .map(|record| self.registry.summary(record))
            .collect()
    }

    /// Resolve `tool_name` to its session and invoke it with `arguments`.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> CallOutcome {
        let call_id = Uuid::new_v4();
        let span = info_span!("call_tool", %call_id, tool = %tool_name);
        self.dispatch(tool_name.trim(), arguments)
            .instrument(span)
            .await
    }

    async fn dispatch(&self, tool_name: &str, arguments: Value) -> CallOutcome {
        if tool_name.is_empty() {
            return CallOutcome::failure(OptimizerError::InvalidArguments(
                "tool_name is required; use find_tool to discover tool names".to_string(),
            ));
        }

        let arguments = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => return CallOutcome::failure(e),
        };

        let Some(record) = self.registry.get(tool_name) else {
            let suggestions = self
                .registry
                .search_top(tool_name, SUGGESTION_LIMIT)
                .iter()
                .map(|r| r.name.clone())
                .collect();
            warn!("Tool not found in registry");
            return CallOutcome::Failure {
                error: OptimizerError::ToolNotFound(tool_name.to_string()),
                suggestions,
            };
        };

        let Some(session) = record.session() else {
            warn!(server = %record.server_name, "Owning session is no longer connected");
            return CallOutcome::failure(OptimizerError::execution(
                tool_name,
                format!("session for server `{}` is no longer connected", record.server_name),
            ));
        };

        debug!(server = %record.server_name, remote = %record.remote_name, "Forwarding call");
        match session.invoke_tool(&record.remote_name, arguments).await {
            Ok(response) => match extract_output(&response) {
                Ok(output) => CallOutcome::Success(output),
                Err(message) => {
                    warn!(error = %message, "Tool reported an error");
                    CallOutcome::failure(OptimizerError::execution(tool_name, message))
                }
            },
            Err(e) => {
                warn!(error = %e, "Tool invocation failed");
                CallOutcome::failure(OptimizerError::execution(tool_name, format!("{e:#}")))
            }
        }
    }

    /// The two meta-tools as handlers for the host runtime.
    pub fn handlers(&self) -> HandlerRegistry {
        HandlerRegistry::new()
            .register_handler(FindToolHandler::new(self.clone()))
            .register_handler(CallToolHandler::new(self.clone()))
    }
}

/// Accept an object, `null`, or a string holding a JSON object.
fn parse_arguments(arguments: Value) -> OptimizerResult<JsonObject> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonObject::new()),
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(JsonObject::new());
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(OptimizerError::InvalidArguments(format!(
                    "arguments must be a JSON object, got {other}"
                ))),
                Err(e) => Err(OptimizerError::InvalidArguments(format!(
                    "arguments must be valid JSON ({e}); example: {{\"issue_key\": \"ABC-121\"}}"
                ))),
            }
        }
        other => Err(OptimizerError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

/// Strip the transport envelope down to the tool's own output.
///
/// Structured content wins; otherwise text blocks are joined and parsed as
/// JSON when possible. A response flagged as an error yields its text, or
/// its structured content when there is no text.
pub fn extract_output(response: &CallToolResult) -> Result<Value, String> {
    let text = response
        .content
        .iter()
        .filter_map(|c| c.raw.as_text())
        .map(|t| t.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if response.is_error == Some(true) {
        if !text.is_empty() {
            return Err(text);
        }
        if let Some(structured) = &response.structured_content {
            return Err(structured.to_string());
        }
        if !response.content.is_empty() {
            return Err(serde_json::to_string(&response.content)
                .unwrap_or_else(|e| format!("malformed tool error: {e}")));
        }
        return Err("tool reported an error without details".to_string());
    }

    if let Some(structured) = &response.structured_content {
        return Ok(structured.clone());
    }

    if text.is_empty() {
        if response.content.is_empty() {
            return Ok(Value::Null);
        }
        // non-text blocks only (images, resources)
        return serde_json::to_value(&response.content)
            .map_err(|e| format!("malformed tool output: {e}"));
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolSession;
    use crate::testing::{FakeSession, structured, text};
    use rmcp::model::Content;
    use std::time::Duration;

    async fn scenario() -> (ToolFactory, Arc<FakeSession>, Arc<FakeSession>) {
        let weather = Arc::new(
            FakeSession::new("weather").with_tool("weather_lookup", "get current weather"),
        );
        let fx = Arc::new(
            FakeSession::new("fx")
                .with_tool("currency_convert", "convert currency amounts")
                .with_response("currency_convert", structured(json!({"amount": 9.2, "currency": "EUR"}))),
        );

        let registry = Arc::new(ToolRegistry::new());
        let weather_dyn: Arc<dyn ToolSession> = weather.clone();
        let fx_dyn: Arc<dyn ToolSession> = fx.clone();
        registry.index(&weather_dyn).await.unwrap();
        registry.index(&fx_dyn).await.unwrap();

        (ToolFactory::new(registry), weather, fx)
    }

    #[tokio::test]
    async fn test_find_tool_weather() {
        let (factory, _w, _f) = scenario().await;
        let found = factory.find_tool("weather", None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "weather_lookup");
        assert_eq!(found[0].description, "get current weather");
    }

    #[tokio::test]
    async fn test_find_tool_empty_query_lists_all() {
        let (factory, _w, _f) = scenario().await;
        let names: Vec<_> = factory.find_tool("", None).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["weather_lookup", "currency_convert"]);
        assert_eq!(factory.find_tool("", Some(1)).len(), 1);
    }

    #[tokio::test]
    async fn test_call_tool_forwards_to_owning_session() {
        let (factory, weather, fx) = scenario().await;
        let args = json!({"from": "USD", "to": "EUR", "amount": 10});

        let outcome = factory.call_tool("currency_convert", args.clone()).await;
        assert_eq!(outcome, CallOutcome::Success(json!({"amount": 9.2, "currency": "EUR"})));

        let calls = fx.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "currency_convert");
        assert_eq!(Value::Object(calls[0].1.clone()), args);
        assert!(weather.calls().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_unknown_name() {
        let (factory, _w, _f) = scenario().await;
        let outcome = factory.call_tool("unknown_tool", json!({})).await;
        assert!(outcome.is_error());
        assert_eq!(outcome.error().unwrap().kind(), "ToolNotFoundError");
        assert_eq!(
            outcome.to_json(),
            json!({"error": "ToolNotFoundError: unknown_tool not found"})
        );
    }

    #[tokio::test]
    async fn test_call_tool_suggests_similar_names() {
        let (factory, _w, _f) = scenario().await;
        let outcome = factory.call_tool("weather", json!({})).await;
        assert_eq!(
            outcome.to_json(),
            json!({
                "error": "ToolNotFoundError: weather not found",
                "suggestions": ["weather_lookup"]
            })
        );
    }

    #[tokio::test]
    async fn test_call_tool_accepts_json_string_arguments() {
        let (factory, _w, fx) = scenario().await;
        let outcome = factory
            .call_tool("currency_convert", json!(r#"{"from": "USD"}"#))
            .await;
        assert!(!outcome.is_error());
        assert_eq!(Value::Object(fx.calls()[0].1.clone()), json!({"from": "USD"}));
    }

    #[tokio::test]
    async fn test_call_tool_rejects_bad_arguments() {
        let (factory, _w, fx) = scenario().await;

        let outcome = factory.call_tool("currency_convert", json!("{not json")).await;
        assert_eq!(outcome.error().unwrap().kind(), "InvalidArguments");

        let outcome = factory.call_tool("currency_convert", json!([1, 2])).await;
        assert_eq!(outcome.error().unwrap().kind(), "InvalidArguments");

        let outcome = factory.call_tool("  ", json!({})).await;
        assert_eq!(outcome.error().unwrap().kind(), "InvalidArguments");

        assert!(fx.calls().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_null_arguments_become_empty_object() {
        let (factory, weather, _f) = scenario().await;
        factory.call_tool("weather_lookup", Value::Null).await;
        assert!(weather.calls()[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_invocation_failure_is_execution_error() {
        let session = FakeSession::new("flaky")
            .with_tool("fetch", "fetch a url")
            .failing_invoke("request timed out")
            .into_dyn();
        let registry = Arc::new(ToolRegistry::new());
        registry.index(&session).await.unwrap();
        let factory = ToolFactory::new(registry);

        let outcome = factory.call_tool("fetch", json!({"url": "x"})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind(), "ExecutionError");
        assert!(err.to_string().contains("request timed out"));
    }

    #[tokio::test]
    async fn test_remote_error_flag_is_execution_error() {
        let session = FakeSession::new("jira")
            .with_tool("jira_get_issue", "get issue")
            .with_response("jira_get_issue", text(&["Issue ABC-1 does not exist"], true))
            .into_dyn();
        let registry = Arc::new(ToolRegistry::new());
        registry.index(&session).await.unwrap();
        let factory = ToolFactory::new(registry);

        let outcome = factory.call_tool("jira_get_issue", json!({})).await;
        assert_eq!(
            outcome.to_json(),
            json!({"error": "ExecutionError: jira_get_issue: Issue ABC-1 does not exist"})
        );
    }

    #[tokio::test]
    async fn test_dropped_session_is_execution_error() {
        let session = FakeSession::new("gone").with_tool("t", "d").into_dyn();
        let registry = Arc::new(ToolRegistry::new());
        registry.index(&session).await.unwrap();
        drop(session);

        let outcome = ToolFactory::new(registry).call_tool("t", json!({})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind(), "ExecutionError");
        assert!(err.to_string().contains("no longer connected"));
    }

    #[tokio::test]
    async fn test_namespaced_call_forwards_remote_name() {
        let session = Arc::new(FakeSession::new("GitHub").with_tool("list_prs", "list pull requests"));
        let registry = Arc::new(ToolRegistry::with_options(crate::registry::RegistryOptions {
            namespace_tools: true,
        }));
        let dyn_session: Arc<dyn ToolSession> = session.clone();
        registry.index(&dyn_session).await.unwrap();

        let outcome = ToolFactory::new(registry)
            .call_tool("github_list_prs", json!({"repo": "x"}))
            .await;
        assert!(!outcome.is_error());
        assert_eq!(session.calls()[0].0, "list_prs");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_call_does_not_block_registry_or_other_sessions() {
        let slow = Arc::new(
            FakeSession::new("slow")
                .with_tool("slow_export", "export everything")
                .hanging_invoke("slow_export"),
        );
        let fx = FakeSession::new("fx")
            .with_tool("currency_convert", "convert currency amounts")
            .into_dyn();
        let registry = Arc::new(ToolRegistry::new());
        let slow_dyn: Arc<dyn ToolSession> = slow.clone();
        registry.index(&slow_dyn).await.unwrap();
        registry.index(&fx).await.unwrap();
        let factory = ToolFactory::new(registry.clone());

        let in_flight = tokio::spawn({
            let factory = factory.clone();
            async move { factory.call_tool("slow_export", json!({})).await }
        });
        tokio::time::timeout(Duration::from_secs(1), async {
            while slow.calls().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("slow call never started");

        let late = FakeSession::new("late")
            .with_tool("late_tool", "added while a call is running")
            .into_dyn();
        let result = tokio::time::timeout(Duration::from_secs(1), async {
            let indexed = registry.index(&late).await.unwrap();
            let outcome = factory.call_tool("currency_convert", json!({"amount": 1})).await;
            let listed = factory.find_tool("", None).len();
            (indexed, outcome.is_error(), listed)
        })
        .await
        .expect("registry blocked behind an in-flight call");

        assert_eq!(result, (1, false, 3));
        assert!(!in_flight.is_finished());
        in_flight.abort();
    }

    #[test]
    fn test_extract_output_variants() {
        assert_eq!(extract_output(&structured(json!({"ok": true}))), Ok(json!({"ok": true})));
        assert_eq!(extract_output(&text(&["{\"n\": 1}"], false)), Ok(json!({"n": 1})));
        assert_eq!(
            extract_output(&text(&["line one", "line two"], false)),
            Ok(json!("line one\nline two"))
        );
        assert_eq!(extract_output(&text(&[], false)), Ok(Value::Null));
        assert_eq!(
            extract_output(&text(&[], true)),
            Err("tool reported an error without details".to_string())
        );
    }

    #[test]
    fn test_error_details_in_structured_content_are_kept() {
        let response = CallToolResult {
            content: vec![],
            structured_content: Some(json!({"message": "quota exceeded for key ABC"})),
            is_error: Some(true),
            meta: None,
        };
        let err = extract_output(&response).unwrap_err();
        assert!(err.contains("quota exceeded for key ABC"));
    }

    #[tokio::test]
    async fn test_structured_remote_error_reaches_the_agent() {
        let failure = CallToolResult {
            content: vec![],
            structured_content: Some(json!({"message": "quota exceeded for key ABC"})),
            is_error: Some(true),
            meta: None,
        };
        let session = FakeSession::new("billing")
            .with_tool("charge", "charge a card")
            .with_response("charge", failure)
            .into_dyn();
        let registry = Arc::new(ToolRegistry::new());
        registry.index(&session).await.unwrap();

        let outcome = ToolFactory::new(registry).call_tool("charge", json!({})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind(), "ExecutionError");
        assert!(err.to_string().contains("quota exceeded for key ABC"));
    }

    #[test]
    fn test_extract_output_prefers_structured_over_text() {
        let response = CallToolResult {
            content: vec![Content::text("human readable")],
            structured_content: Some(json!({"machine": 1})),
            is_error: None,
            meta: None,
        };
        assert_eq!(extract_output(&response), Ok(json!({"machine": 1})));
    }

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments(json!("")).unwrap().is_empty());
        assert_eq!(
            parse_arguments(json!(" {\"a\": 1} ")).unwrap().get("a"),
            Some(&json!(1))
        );
        assert!(parse_arguments(json!(42)).is_err());
        assert!(parse_arguments(json!("[1]")).is_err());
    }
}
