//! MCP protocol implementation over JSON-RPC 2.0.

pub mod handler;
pub mod http;
pub mod server;
pub mod transport;
pub mod types;

pub use handler::{Dispatcher, Handler, RequestContext};
pub use http::{HttpTransport, ServerSelector};
pub use server::{McpServer, McpServerBuilder, RunState, ServerState};
pub use transport::{StdioTransport, StreamTransport, Transport};
pub use types::*;
