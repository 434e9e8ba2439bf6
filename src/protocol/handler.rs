//! Request handler and method dispatcher.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::*;
use crate::shutdown::ShutdownToken;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Per-request context threaded from the serving layer through dispatch.
///
/// Carries the request id and the server's root cancellation token, so a
/// long-running `tools/call` can observe shutdown no matter which transport
/// delivered it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Option<RequestId>,
    shutdown: ShutdownToken,
}

impl RequestContext {
    pub fn new(id: Option<RequestId>, shutdown: ShutdownToken) -> Self {
        Self { id, shutdown }
    }

    /// A context with its own root token, never cancelled externally.
    pub fn detached() -> Self {
        Self::new(None, ShutdownToken::new())
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn shutdown(&self) -> &ShutdownToken {
        &self.shutdown
    }
}

/// Handler trait for processing MCP requests.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle initialize request.
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult>;

    /// Handle initialized notification.
    async fn initialized(&self) -> ProtocolResult<()>;

    /// Handle shutdown request.
    async fn shutdown(&self) -> ProtocolResult<()>;

    /// List available tools.
    async fn list_tools(&self) -> ProtocolResult<ListToolsResult>;

    /// Call a tool. The context carries the cancellation signal the handler
    /// must propagate into the tool execution.
    async fn call_tool(
        &self,
        ctx: RequestContext,
        params: CallToolParams,
    ) -> ProtocolResult<CallToolResult>;

    /// Handle ping request.
    async fn ping(&self) -> ProtocolResult<Value> {
        Ok(serde_json::json!({}))
    }
}

/// Method dispatcher that routes requests to appropriate handlers.
pub struct Dispatcher<H: Handler> {
    handler: Arc<H>,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Dispatch a request to the appropriate handler method.
    ///
    /// Always produces a response; handler failures become JSON-RPC error
    /// objects rather than terminating the serve loop.
    #[instrument(skip(self, ctx, request), fields(method = %request.method))]
    pub async fn dispatch(&self, ctx: RequestContext, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Dispatching request: {}", request.method);
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        match self.route(ctx, &method, params).await {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                error!("Request failed: {}", e);
                JsonRpcResponse::error(id, JsonRpcError::new(e.code(), e.to_string()))
            }
        }
    }

    async fn route(
        &self,
        ctx: RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> ProtocolResult<Value> {
        match method {
            "initialize" => encode(self.handler.initialize(decode_params(params)?).await?),
            "initialized" | "notifications/initialized" => {
                self.handler.initialized().await?;
                Ok(Value::Null)
            }
            "shutdown" => {
                self.handler.shutdown().await?;
                Ok(Value::Null)
            }
            "ping" => self.handler.ping().await,
            "tools/list" => encode(self.handler.list_tools().await?),
            "tools/call" => encode(self.handler.call_tool(ctx, decode_params(params)?).await?),
            method => {
                warn!("Unknown method: {}", method);
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        }
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> ProtocolResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?
        .ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))
}

fn encode<T: Serialize>(value: T) -> ProtocolResult<Value> {
    serde_json::to_value(value).map_err(|e| ProtocolError::InternalError(e.to_string().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockHandler {
        initialized: AtomicBool,
    }

    impl MockHandler {
        fn new() -> Self {
            Self {
                initialized: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Handler for MockHandler {
        async fn initialize(&self, _params: InitializeParams) -> ProtocolResult<InitializeResult> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(InitializeResult {
                protocol_version: MCP_VERSION.into(),
                capabilities: ServerCapabilities::default(),
                server_info: ServerInfo {
                    name: "test".into(),
                    version: "1.0".into(),
                },
                instructions: None,
            })
        }

        async fn initialized(&self) -> ProtocolResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> ProtocolResult<()> {
            Ok(())
        }

        async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
            Ok(ListToolsResult {
                tools: vec![],
                next_cursor: None,
            })
        }

        async fn call_tool(
            &self,
            ctx: RequestContext,
            _params: CallToolParams,
        ) -> ProtocolResult<CallToolResult> {
            if ctx.shutdown().is_cancelled() {
                return Ok(CallToolResult::error(ErrorKind::Cancelled, "cancelled"));
            }
            Ok(CallToolResult::text("test"))
        }
    }

    #[tokio::test]
    async fn test_dispatcher_initialize() {
        let handler = Arc::new(MockHandler::new());
        let dispatcher = Dispatcher::new(handler.clone());

        let request = JsonRpcRequest::new("initialize")
            .with_id(1)
            .with_params(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "test-client",
                    "version": "1.0"
                }
            }));

        let response = dispatcher.dispatch(RequestContext::detached(), request).await;
        assert!(response.result.is_some());
        assert!(response.error.is_none());
        assert!(handler.initialized.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispatcher_unknown_method() {
        let handler = Arc::new(MockHandler::new());
        let dispatcher = Dispatcher::new(handler);

        let request = JsonRpcRequest::new("unknown/method").with_id(1);
        let response = dispatcher.dispatch(RequestContext::detached(), request).await;

        assert!(response.result.is_none());
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_dispatcher_call_tool_missing_params() {
        let handler = Arc::new(MockHandler::new());
        let dispatcher = Dispatcher::new(handler);

        let request = JsonRpcRequest::new("tools/call").with_id(2);
        let response = dispatcher.dispatch(RequestContext::detached(), request).await;

        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_dispatcher_hands_cancellation_to_call_tool() {
        let dispatcher = Dispatcher::new(Arc::new(MockHandler::new()));

        let token = ShutdownToken::new();
        token.trigger();
        let ctx = RequestContext::new(Some(RequestId::Number(3)), token);

        let request = JsonRpcRequest::new("tools/call")
            .with_id(3)
            .with_params(serde_json::json!({"name": "test"}));
        let response = dispatcher.dispatch(ctx, request).await;

        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    }
}
