//! MCP server with lifecycle management.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::handler::{Dispatcher, Handler, RequestContext};
use crate::protocol::transport::Transport;
use crate::protocol::types::*;
use crate::shutdown::ShutdownToken;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Protocol lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Server created but not initialized.
    Created,
    /// Initialize request received, awaiting initialized notification.
    Initializing,
    /// Server is fully operational.
    Running,
    /// Shutdown requested.
    ShuttingDown,
    /// Server has stopped.
    Stopped,
}

/// State of a server/transport pairing.
///
/// `run_with_transport` is called exactly once per server; a second call is
/// rejected instead of silently restarting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Run loop exited cleanly (EOF or shutdown).
    Closed,
    /// Run loop exited on a transport error.
    Failed,
}

/// MCP Server: owns one handler and drives a receive-dispatch-reply loop
/// over a single transport.
pub struct McpServer<H: Handler> {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    dispatcher: Dispatcher<H>,
    state: RwLock<ServerState>,
    run_state: RwLock<RunState>,
    shutdown: ShutdownToken,
}

impl<H: Handler> McpServer<H> {
    /// Create a new MCP server.
    pub fn new(handler: H, info: ServerInfo, capabilities: ServerCapabilities) -> Self {
        Self {
            info,
            capabilities,
            dispatcher: Dispatcher::new(Arc::new(handler)),
            state: RwLock::new(ServerState::Created),
            run_state: RwLock::new(RunState::Idle),
            shutdown: ShutdownToken::new(),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Get current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Get the state of the run loop.
    pub fn run_state(&self) -> RunState {
        *self.run_state.read()
    }

    pub fn is_running(&self) -> bool {
        *self.run_state.read() == RunState::Running
    }

    /// Root cancellation token. Cloned into tool contexts by the handler layer.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Request the run loop to stop.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Dispatch a single request, tracking lifecycle transitions.
    ///
    /// Shared by the stream run loop and the HTTP transport, which drives
    /// dispatch per inbound POST instead of owning a read loop. The request
    /// context handed to dispatch carries this server's root token, so every
    /// in-flight tool call observes `stop` or the `shutdown` method.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if requires_initialize(&request.method) && self.state() == ServerState::Created {
            let e = ProtocolError::NotInitialized;
            return JsonRpcResponse::error(request.id, JsonRpcError::new(e.code(), e.to_string()));
        }

        self.update_state_for_method(&request.method);
        let shutting_down = request.method == "shutdown";

        let ctx = RequestContext::new(request.id.clone(), self.shutdown.clone());
        let response = self.dispatcher.dispatch(ctx, request).await;

        if shutting_down {
            info!("Shutdown request received");
            self.shutdown.trigger();
        }
        response
    }

    /// Run the server over the given transport until EOF, shutdown, or a
    /// transport error.
    ///
    /// One message is fully dispatched before the next is read, so responses
    /// on this channel always come back in request order.
    #[instrument(skip(self, transport), fields(server = %self.info.name))]
    pub async fn run_with_transport<T: Transport>(&self, transport: T) -> Result<()> {
        {
            let mut run_state = self.run_state.write();
            if *run_state != RunState::Idle {
                return Err(McpError::Protocol(ProtocolError::AlreadyRunning));
            }
            *run_state = RunState::Running;
        }

        info!("Starting MCP server: {} v{}", self.info.name, self.info.version);

        let outcome = self.serve_loop(&transport).await;

        let exit_state = match &outcome {
            Ok(()) => RunState::Closed,
            Err(_) => RunState::Failed,
        };
        *self.run_state.write() = exit_state;
        *self.state.write() = ServerState::Stopped;
        info!("Server stopped");
        outcome
    }

    async fn serve_loop<T: Transport>(&self, transport: &T) -> Result<()> {
        loop {
            let message = tokio::select! {
                message = transport.read_message() => message,
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping run loop");
                    return Ok(());
                }
            };

            let message = match message {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!("EOF received, shutting down");
                    return Ok(());
                }
                Err(McpError::Protocol(ProtocolError::ParseError)) => {
                    // Malformed frame: answer with a parse error, keep serving.
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    if let Err(e) = transport.write_response(&response).await {
                        error!("Failed to send error response: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    return Err(e);
                }
            };

            match message {
                Message::Request(request) => {
                    let is_notification = request.is_notification();
                    let response = self.handle(request).await;

                    // Notifications get no wire response.
                    if !is_notification
                        && let Err(e) = transport.write_response(&response).await
                    {
                        error!("Failed to send response: {}", e);
                        return Err(e);
                    }

                    if self.shutdown.is_cancelled() {
                        return Ok(());
                    }
                }
                Message::Response(response) => {
                    // We don't expect responses in server mode, but log them
                    warn!("Unexpected response received: {:?}", response.id);
                }
            }
        }
    }

    fn update_state_for_method(&self, method: &str) {
        let mut state = self.state.write();
        match method {
            "initialize" => {
                if *state == ServerState::Created {
                    *state = ServerState::Initializing;
                }
            }
            "initialized" | "notifications/initialized" => {
                if *state == ServerState::Initializing {
                    *state = ServerState::Running;
                    info!("Server initialized and running");
                }
            }
            "shutdown" => {
                *state = ServerState::ShuttingDown;
            }
            _ => {}
        }
    }
}

/// Tool surface methods require the initialize handshake to have started.
fn requires_initialize(method: &str) -> bool {
    matches!(method, "tools/list" | "tools/call")
}

/// Builder for MCP Server.
pub struct McpServerBuilder<H: Handler> {
    handler: Option<H>,
    name: String,
    version: String,
    capabilities: ServerCapabilities,
}

impl<H: Handler> McpServerBuilder<H> {
    pub fn new() -> Self {
        Self {
            handler: None,
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            capabilities: ServerCapabilities::default(),
        }
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_tools(mut self) -> Self {
        self.capabilities.tools = Some(ToolsCapability {
            list_changed: Some(false),
        });
        self
    }

    pub fn build(self) -> Result<McpServer<H>> {
        let handler = self.handler.ok_or_else(|| McpError::Internal {
            message: "Handler is required".into(),
        })?;

        Ok(McpServer::new(
            handler,
            ServerInfo {
                name: self.name,
                version: self.version,
            },
            self.capabilities,
        ))
    }
}

impl<H: Handler> Default for McpServerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
