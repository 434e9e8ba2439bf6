//! MCP server core with pluggable transports and typed tool invocation.
//!
//! Hosts a registry of tools behind a JSON-RPC 2.0 dispatch loop. The same
//! server can be served over a newline-delimited byte stream (stdio) or
//! streamable HTTP without the tool handlers knowing which transport is in
//! front of them.
//!
//! # Example
//!
//! ```no_run
//! use greeter_mcp::{
//!     protocol::{McpServerBuilder, StdioTransport},
//!     server::{McpHandler, ServerStateBuilder},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Server state carries the config and the tool registry
//!     let state = Arc::new(ServerStateBuilder::new().build()?);
//!
//!     // Create and run the server over stdio
//!     let handler = McpHandler::new(state);
//!     let server = McpServerBuilder::new()
//!         .handler(handler)
//!         .with_tools()
//!         .build()?;
//!
//!     server.run_with_transport(StdioTransport::stdio()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod shutdown;
pub mod tools;

pub use config::{HttpConfig, ServerConfig, ServerConfigBuilder, TransportConfig};
pub use error::{McpError, Result};
pub use protocol::{HttpTransport, McpServer, McpServerBuilder, RequestContext, StdioTransport};
pub use schema::{FieldType, Shape, ShapeBuilder, UnknownFields};
pub use server::{McpHandler, ServerState, ServerStateBuilder};
pub use shutdown::ShutdownToken;
pub use tools::{ToolContext, ToolHandler, ToolRegistry, create_registry};
