//! MCP request handler implementation.

use crate::error::ProtocolResult;
use crate::protocol::{
    CallToolParams, CallToolResult, Handler, InitializeParams, InitializeResult, ListToolsResult,
    MCP_VERSION, RequestContext, ServerCapabilities, ServerInfo, ToolsCapability,
};
use crate::server::state::ServerState;
use crate::tools::ToolContext;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// MCP request handler that processes protocol messages against the tool
/// registry held in [`ServerState`].
pub struct McpHandler {
    state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

#[async_trait]
impl Handler for McpHandler {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult> {
        info!(
            "Initialize request from {} v{}",
            params.client_info.name, params.client_info.version
        );

        self.state.set_initialized(params.client_info);

        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let instructions = self.state.config.instructions.clone().unwrap_or_else(|| {
            let names: Vec<String> = self
                .state
                .tools
                .list()
                .into_iter()
                .map(|t| t.name)
                .collect();
            format!("Tool server. Available tools: {}.", names.join(", "))
        });

        Ok(InitializeResult {
            protocol_version: MCP_VERSION.into(),
            capabilities,
            server_info: ServerInfo {
                name: self.state.config.name.to_string(),
                version: self.state.config.version.to_string(),
            },
            instructions: Some(instructions),
        })
    }

    async fn initialized(&self) -> ProtocolResult<()> {
        info!("Server initialized successfully");
        Ok(())
    }

    async fn shutdown(&self) -> ProtocolResult<()> {
        info!("Shutdown request received");
        Ok(())
    }

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
        let tools = self.state.tools.list();
        debug!("Listing {} tools", tools.len());

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        ctx: RequestContext,
        params: CallToolParams,
    ) -> ProtocolResult<CallToolResult> {
        debug!("Tool call: {}", params.name);
        self.state.next_request_id();

        // The dispatch context carries the server's root token; the tool
        // context derived from it is what makes shutdown reach the handler.
        let tool_ctx = ToolContext::new(ctx.shutdown().clone());
        Ok(self.state.tools.execute(tool_ctx, params).await)
    }
}
