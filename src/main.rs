//! MCP server binary entry point.

use anyhow::Result;
use clap::Parser;
use greeter_mcp::{
    config::{ServerConfig, TransportConfig},
    protocol::{HttpTransport, McpServerBuilder, StdioTransport},
    server::{McpHandler, ServerStateBuilder},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// MCP server exposing greeting tools over stdio or streamable HTTP.
#[derive(Parser)]
#[command(name = "greeter-mcp", version, about)]
struct Cli {
    /// Serve JSON-RPC over HTTP at this address instead of stdio
    #[arg(long, value_name = "HOST:PORT", env = "GREETER_MCP_HTTP")]
    http: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let transport = match cli.http.as_deref() {
        Some(addr) => TransportConfig::http_from_addr(addr)?,
        None => TransportConfig::Stdio,
    };

    let config = ServerConfig::builder()
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .transport(transport.clone())
        .build();

    let state = Arc::new(ServerStateBuilder::new().config(config).build()?);

    info!("Server state initialized with {} tools", state.tools.len());

    let handler = McpHandler::new(state);
    let server = Arc::new(
        McpServerBuilder::new()
            .handler(handler)
            .name(env!("CARGO_PKG_NAME"))
            .version(env!("CARGO_PKG_VERSION"))
            .with_tools()
            .build()?,
    );

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal, shutting down");
            shutdown.trigger();
        }
    });

    info!("MCP server ready, transport: {}", transport.description());

    match transport {
        TransportConfig::Stdio => {
            server.run_with_transport(StdioTransport::stdio()).await?;
        }
        TransportConfig::Http(http_config) => {
            let transport = HttpTransport::single(http_config, Arc::clone(&server));
            transport.run(server.shutdown_token()).await?;
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("greeter_mcp=info,warn"));

    // Stdout carries the protocol; logs go to stderr as JSON
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
