use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use toolbridge_core::ToolCall;
use toolbridge_mcp::{McpClient, McpConfig, ServiceStatus, ToolRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolbridge", about = "Toolbridge — MCP tool discovery and invocation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "toolbridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or invoke exposed tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Inspect configured MCP services
    Services {
        #[command(subcommand)]
        action: ServicesAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List tools exposed by all enabled services
    List {
        /// Print the definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a tool by its exposed name
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
}

#[derive(Subcommand)]
enum ServicesAction {
    /// Probe every service and print its status
    Status,
}

#[derive(Deserialize, Default)]
struct ToolbridgeConfig {
    #[serde(default)]
    mcp: McpConfig,
}

fn parse_config(raw: &str) -> anyhow::Result<ToolbridgeConfig> {
    let mut config: ToolbridgeConfig = toml::from_str(raw)?;
    config.mcp.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config = parse_config(&config_str)?;

    let directory = Arc::new(config.mcp.directory()?);
    let client = Arc::new(McpClient::new(&config.mcp)?);
    let registry = ToolRegistry::new(directory, client, config.mcp.tool_cache_ttl());
    info!(
        services = config.mcp.services.len(),
        timeout_secs = config.mcp.request_timeout().as_secs(),
        "Toolbridge configured"
    );

    match cli.command {
        Commands::Tools { action } => match action {
            ToolsAction::List { json } => {
                let tools = registry.list_tools().await;
                if json {
                    let rendered: Vec<serde_json::Value> =
                        tools.iter().map(|t| t.to_function_json()).collect();
                    println!("{}", serde_json::to_string_pretty(&rendered)?);
                } else if tools.is_empty() {
                    println!("No tools available.");
                    println!("Configure services in toolbridge.toml under [[mcp.services]]");
                } else {
                    println!("Available tools:");
                    for tool in &tools {
                        println!("  {} — {}", tool.name, tool.description);
                    }
                    println!("\nTotal: {} tool(s)", tools.len());
                }
            }
            ToolsAction::Call { name, args } => {
                let arguments = args
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null);
                let call = ToolCall::new(uuid::Uuid::new_v4().to_string(), name, arguments);
                let output = registry.call_tool(&call).await?;
                println!("{output}");
            }
        },
        Commands::Services { action } => match action {
            ServicesAction::Status => {
                let statuses = registry.list_service_statuses().await;
                if statuses.is_empty() {
                    println!("No services configured.");
                }
                for status in &statuses {
                    print_status(status);
                }
            }
        },
    }

    Ok(())
}

fn print_status(status: &ServiceStatus) {
    let state = if !status.enabled {
        "disabled"
    } else if status.connected {
        "connected"
    } else {
        "unreachable"
    };
    println!(
        "{} ({}, {}) — {}, {}/{} tool(s) enabled",
        status.service_id,
        status.service_name,
        status.transport,
        state,
        status.tool_count,
        status.tools.len()
    );
    if status.enabled {
        if let Some(error) = &status.error {
            println!("    error: {error}");
        }
    }
    for tool in &status.tools {
        let flag = if tool.enabled { "on " } else { "off" };
        println!("    [{flag}] {}", tool.name);
    }
}
