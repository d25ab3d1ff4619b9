// MCP client sessions backed by rmcp

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult, JsonObject};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{
    ServiceExt,
    service::{RoleClient, RunningService as RmcpRunningService},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::process::Command;
use tracing::info;

use crate::config::McpServiceConfig;
use crate::session::{ToolDescriptor, ToolSession};

/// A connected MCP server.
///
/// Holds the rmcp `RunningService` handle used to talk MCP (list_tools,
/// call_tool) plus the per-server tool filter from `mcp.json`.
pub struct RunningService {
    id: String,
    disabled_tools: HashSet<String>,
    pub client: RmcpRunningService<RoleClient, ()>,
}

impl RunningService {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Close the connection. Sessions are owned by whoever started them.
    pub async fn shutdown(self) -> Result<()> {
        self.client.cancel().await?;
        Ok(())
    }
}

#[async_trait]
impl ToolSession for RunningService {
    fn server_name(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self.client.list_all_tools().await?;

        Ok(tools
            .into_iter()
            .filter(|tool| {
                let disabled = self.disabled_tools.contains(tool.name.as_ref());
                if disabled {
                    info!("Skipping disabled tool `{}` on `{}`", tool.name, self.id);
                }
                !disabled
            })
            .map(|tool| ToolDescriptor {
                name: tool.name.to_string(),
                description: tool
                    .description
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                input_schema: unwrap_schema((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn invoke_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult> {
        let request = CallToolRequestParams {
            meta: None,
            name: Cow::from(name.to_string()),
            arguments: Some(arguments),
            task: None,
        };

        let resp = self.client.call_tool(request).await?;
        Ok(resp)
    }
}

/// Some servers wrap the schema as `{"json": {...}}`; unwrap it.
fn unwrap_schema(schema: JsonObject) -> JsonObject {
    if schema.len() == 1 {
        if let Some(inner) = schema.get("json").and_then(|v| v.as_object()) {
            return inner.clone();
        }
    }
    schema
}

pub async fn start_stdio_service(cfg: &McpServiceConfig) -> Result<Option<RunningService>> {
    if let McpServiceConfig::Stdio {
        id,
        command,
        args,
        env,
        disabled,
        disabled_tools,
    } = cfg
    {
        if *disabled {
            info!("Skipping disabled MCP stdio service `{id}`");
            return Ok(None);
        }

        info!("Starting MCP stdio service `{id}` via rmcp");

        let child = TokioChildProcess::new(Command::new(command).configure(|cmd| {
            cmd.args(args.iter());
            cmd.envs(env.iter());
        }))?;

        let client = ().serve(child).await?;

        Ok(Some(RunningService {
            id: id.clone(),
            disabled_tools: disabled_tools.iter().cloned().collect(),
            client,
        }))
    } else {
        Ok(None)
    }
}

pub async fn start_http_service(cfg: &McpServiceConfig) -> Result<Option<RunningService>> {
    if let McpServiceConfig::Http {
        id,
        url,
        headers,
        disabled,
        disabled_tools,
    } = cfg
    {
        if *disabled {
            info!("Skipping disabled MCP HTTP service `{id}`");
            return Ok(None);
        }

        info!("Starting MCP HTTP service `{id}` at `{url}` via rmcp streamable HTTP");

        let http_client = build_http_client(headers)
            .with_context(|| format!("invalid headers for `{id}`"))?;
        let transport = StreamableHttpClientTransport::with_client(
            http_client,
            StreamableHttpClientTransportConfig::with_uri(url.as_str()),
        );

        // Same client type as stdio: RmcpRunningService<RoleClient, ()>
        let client = ().serve(transport).await?;

        Ok(Some(RunningService {
            id: id.clone(),
            disabled_tools: disabled_tools.iter().cloned().collect(),
            client,
        }))
    } else {
        Ok(None)
    }
}

/// HTTP client that sends the configured headers on every request.
fn build_http_client(headers: &BTreeMap<String, String>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));

    let header_map = build_request_headers(headers)?;
    if !header_map.is_empty() {
        builder = builder.default_headers(header_map);
    }

    Ok(builder.build()?)
}

fn build_request_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("header name `{key}`"))?;
        let value =
            HeaderValue::from_str(value).with_context(|| format!("header value for `{key}`"))?;
        map.insert(name, value);
    }
    Ok(map)
}

pub async fn start_service(cfg: &McpServiceConfig) -> Result<Option<RunningService>> {
    match cfg {
        McpServiceConfig::Stdio { .. } => start_stdio_service(cfg).await,
        McpServiceConfig::Http { .. } => start_http_service(cfg).await,
    }
}
