//! `mcp.json` loading.
//!
//! The file uses the common `mcpServers` layout. `${VAR}` references in
//! commands, args, env values, URLs and headers are expanded from the process
//! environment; unknown variables are left as written.

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::error::{OptimizerError, OptimizerResult};

#[derive(Debug, Deserialize)]
pub struct McpJsonConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct McpServerConfig {
    // stdio server
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    // http server
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    // flags
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, alias = "disabledTools")]
    pub disabled_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum McpServiceConfig {
    Stdio {
        id: String,
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        disabled: bool,
        disabled_tools: Vec<String>,
    },
    Http {
        id: String,
        url: String,
        headers: BTreeMap<String, String>,
        disabled: bool,
        disabled_tools: Vec<String>,
    },
}

impl McpServiceConfig {
    pub fn from_json(id: String, cfg: McpServerConfig) -> OptimizerResult<Self> {
        if let Some(cmd) = cfg.command {
            return Ok(McpServiceConfig::Stdio {
                id,
                command: cmd,
                args: cfg.args,
                env: cfg.env,
                disabled: cfg.disabled,
                disabled_tools: cfg.disabled_tools,
            });
        }

        if let Some(url) = cfg.url {
            url::Url::parse(&url).map_err(|e| {
                OptimizerError::Config(format!("Server `{}` has an invalid url `{}`: {}", id, url, e))
            })?;
            return Ok(McpServiceConfig::Http {
                id,
                url,
                headers: cfg.headers,
                disabled: cfg.disabled,
                disabled_tools: cfg.disabled_tools,
            });
        }

        Err(OptimizerError::Config(format!(
            "Server `{}` must have either `command` or `url`",
            id
        )))
    }

    pub fn id(&self) -> &str {
        match self {
            McpServiceConfig::Stdio { id, .. } | McpServiceConfig::Http { id, .. } => id,
        }
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            McpServiceConfig::Stdio { disabled, .. } | McpServiceConfig::Http { disabled, .. } => {
                *disabled
            }
        }
    }

    pub fn disabled_tools(&self) -> &[String] {
        match self {
            McpServiceConfig::Stdio { disabled_tools, .. }
            | McpServiceConfig::Http { disabled_tools, .. } => disabled_tools,
        }
    }
}

/// Locate `mcp.json`: explicit path, `$MCP_CONFIG`, `$XDG_CONFIG_HOME/mcp/mcp.json`,
/// then `./mcp.json`.
pub fn resolve_mcp_json_path(explicit: Option<&Path>) -> OptimizerResult<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }

    if let Ok(p) = env::var("MCP_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("mcp").join("mcp.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("mcp.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(OptimizerError::Config(
        "Could not find mcp.json (pass --config, set MCP_CONFIG or create ./mcp.json)".to_string(),
    ))
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_server(cfg: McpServerConfig) -> McpServerConfig {
    let mut cfg = cfg;

    for val in cfg.env.values_mut() {
        *val = expand_env_vars(val);
    }
    for val in cfg.headers.values_mut() {
        *val = expand_env_vars(val);
    }
    if let Some(cmd) = cfg.command.as_mut() {
        *cmd = expand_env_vars(cmd);
    }
    cfg.args = cfg.args.into_iter().map(|a| expand_env_vars(&a)).collect();
    if let Some(url) = cfg.url.as_mut() {
        *url = expand_env_vars(url);
    }

    cfg
}

/// Parse the contents of an `mcp.json` file.
pub fn parse_mcp_services(raw: &str) -> OptimizerResult<Vec<McpServiceConfig>> {
    let cfg: McpJsonConfig = serde_json::from_str(raw)
        .map_err(|e| OptimizerError::Config(format!("Invalid mcp.json: {}", e)))?;

    let mut services = Vec::new();
    for (id, server_cfg) in cfg.mcp_servers {
        let expanded = expand_server(server_cfg);
        services.push(McpServiceConfig::from_json(id, expanded)?);
    }

    Ok(services)
}

pub fn load_mcp_services(explicit: Option<&Path>) -> OptimizerResult<Vec<McpServiceConfig>> {
    let path = resolve_mcp_json_path(explicit)?;
    let raw = fs::read_to_string(&path).map_err(|e| {
        OptimizerError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_mcp_services(&raw)
}
