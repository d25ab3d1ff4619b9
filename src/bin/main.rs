use anyhow::Result;
use clap::{Parser, Subcommand};
use mcp_optimizer::{RegistryOptions, bootstrap};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

// rmcp imports for MCP stdio server mode
use rmcp::service::ServiceExt;
use rmcp::transport::stdio;

#[derive(Parser)]
#[command(name = "mcp-optimizer")]
#[command(about = "Expose many MCP servers through two meta-tools: find_tool and call_tool")]
struct Cli {
    /// Path to mcp.json (defaults to $MCP_CONFIG, $XDG_CONFIG_HOME/mcp/mcp.json, ./mcp.json)
    #[arg(long, global = true, env = "MCP_CONFIG")]
    config: Option<PathBuf>,
    /// Register tools as `<server>_<tool>` instead of their bare names
    #[arg(long, global = true, default_value_t = false)]
    namespace_tools: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as an MCP stdio server (for use in mcp.json)
    McpStdio,
    /// Run as an MCP HTTP server
    McpHttp {
        /// Bind address, e.g. 0.0.0.0:3942
        #[arg(long, default_value = "127.0.0.1:3942")]
        bind: String,
    },
    /// List every indexed tool, grouped by server
    List,
    /// Search for tools
    Find {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Call a tool by exact name with JSON arguments
    Call {
        tool_name: String,
        /// Arguments as a JSON object string, e.g. '{"issue_key": "ABC-121"}'
        arguments: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP stdio protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mcp_optimizer=info".parse()?)
                .add_directive("rmcp=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = RegistryOptions {
        namespace_tools: cli.namespace_tools,
    };
    let orchestrator = bootstrap(cli.config.as_deref(), options).await?;

    match cli.command {
        Commands::McpStdio => {
            info!("Starting MCP stdio server (rmcp)");

            let service = orchestrator
                .server()
                .serve(stdio())
                .await
                .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;

            // Block until the MCP session ends.
            service.waiting().await?;
            info!("MCP stdio server session ended");
        }
        Commands::McpHttp { bind } => {
            info!("Starting MCP HTTP server (rmcp) on {}", bind);
            mcp_optimizer::server::start_mcp_http(orchestrator.server(), &bind).await?;
        }
        Commands::List => {
            let registry = orchestrator.registry();
            println!("Total tools indexed : {}", registry.len());
            println!("Servers             : {}", registry.servers().join(", "));
            println!();
            for record in registry.records() {
                println!("  [{}] {}", record.server_name, record.name);
                println!("    {}", record.description.chars().take(80).collect::<String>());
            }
        }
        Commands::Find { query, limit } => {
            let results = orchestrator.factory().find_tool(&query, limit);
            if results.is_empty() {
                println!("No tools found matching '{}'.", query);
                println!("Available servers: {}", orchestrator.registry().servers().join(", "));
                return Ok(());
            }

            println!("Found {} tool(s) matching '{}':", results.len(), query);
            for (i, summary) in results.iter().enumerate() {
                println!("[{}] {}", i + 1, summary.render());
            }
        }
        Commands::Call {
            tool_name,
            arguments,
        } => {
            let arguments = arguments.map(Value::String).unwrap_or(Value::Null);
            let outcome = orchestrator.factory().call_tool(&tool_name, arguments).await;
            println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            if outcome.is_error() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
