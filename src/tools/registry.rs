//! Tool registry and dispatch core.
//!
//! The registry maps tool names to handlers and owns the dispatch pipeline:
//! lookup, argument validation against the registered shape, supervised
//! handler execution, and conversion of every failure mode into a well-formed
//! error result. A misbehaving tool call never takes down the serve loop.

use crate::error::{ToolError, ToolResult};
use crate::protocol::{CallToolParams, CallToolResult, ErrorKind, Tool};
use crate::schema::Shape;
use crate::shutdown::ShutdownToken;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Per-call context handed to tool handlers.
///
/// Carries the cancellation signal derived from server shutdown. Handlers
/// performing downstream I/O should select against [`ToolContext::cancelled`]
/// and abort promptly when it resolves.
#[derive(Debug, Clone)]
pub struct ToolContext {
    shutdown: ShutdownToken,
}

impl ToolContext {
    pub fn new(shutdown: ShutdownToken) -> Self {
        Self { shutdown }
    }

    /// A context with its own root token, never cancelled externally.
    pub fn detached() -> Self {
        Self::new(ShutdownToken::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }
}

/// A named, shape-described unit of server-side functionality.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Shape the arguments are validated against before [`execute`](Self::execute)
    /// is invoked. Built once at construction, cached for the registry's lifetime.
    fn input_shape(&self) -> &Shape;

    /// Declared shape of `structuredContent`, if the tool produces one.
    fn output_shape(&self) -> Option<&Shape> {
        None
    }

    /// Wire definition advertised in `tools/list`. Derived from the cached
    /// shapes so the advertisement can never drift from what is validated.
    fn definition(&self) -> Tool {
        Tool {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            input_schema: self.input_shape().to_schema(),
            output_schema: self.output_shape().map(Shape::to_schema),
        }
    }

    /// Invoked only with arguments that passed shape validation.
    async fn execute(&self, ctx: ToolContext, arguments: Value) -> ToolResult<CallToolResult>;
}

/// Registry of tool handlers keyed by name.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Register a tool. The first registration of a name wins; a duplicate is
    /// rejected and the registry is left unchanged.
    pub fn register<T: ToolHandler + 'static>(&self, tool: T) -> ToolResult<()> {
        let name = tool.name().to_string();
        match self.tools.entry(name.clone()) {
            Entry::Occupied(_) => Err(ToolError::Duplicate(name)),
            Entry::Vacant(slot) => {
                debug!("Registering tool: {}", name);
                slot.insert(Arc::new(tool));
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|r| Arc::clone(&*r))
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|r| r.value().definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one tool call.
    ///
    /// Every failure mode comes back as an error result tagged with its
    /// [`ErrorKind`]; this method never returns a transport- or process-level
    /// error and never panics on a panicking handler.
    #[instrument(skip(self, ctx, params), fields(tool = %params.name))]
    pub async fn execute(&self, ctx: ToolContext, params: CallToolParams) -> CallToolResult {
        let Some(tool) = self.get(&params.name) else {
            warn!("Tool not found: {}", params.name);
            return CallToolResult::error(
                ErrorKind::ToolNotFound,
                format!("Tool not found: {}", params.name),
            );
        };

        // Validation runs before the handler; malformed arguments never reach
        // handler code.
        if let Err(e) = tool.input_shape().validate(&params.arguments) {
            debug!("Argument validation failed: {}", e);
            return CallToolResult::error(ErrorKind::InvalidArguments, e.to_string());
        }

        let output_shape = tool.output_shape().cloned();
        let task_ctx = ctx.clone();
        let arguments = params.arguments;
        let mut task = tokio::spawn(async move { tool.execute(task_ctx, arguments).await });

        let result = tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(ToolError::Cancelled)) => {
                    CallToolResult::error(ErrorKind::Cancelled, "tool call cancelled")
                }
                Ok(Err(e)) => CallToolResult::error(ErrorKind::HandlerError, e.to_string()),
                Err(join_error) => {
                    // A panicking handler is converted here instead of
                    // unwinding through the dispatch loop.
                    error!("Tool '{}' aborted: {}", params.name, join_error);
                    CallToolResult::error(
                        ErrorKind::InternalError,
                        format!("tool '{}' aborted unexpectedly", params.name),
                    )
                }
            },
            _ = ctx.cancelled() => {
                task.abort();
                CallToolResult::error(ErrorKind::Cancelled, "server shutting down")
            }
        };

        if let (Some(shape), Some(output), false) = (
            output_shape,
            result.structured_content.as_ref(),
            result.is_error(),
        ) {
            for mismatch in shape.check_output(output) {
                warn!("Tool '{}' output shape mismatch: {}", params.name, mismatch);
            }
        }

        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Probe tool recording whether its handler body ran.
    struct ProbeTool {
        shape: Shape,
        called: Arc<AtomicBool>,
    }

    impl ProbeTool {
        fn new(called: Arc<AtomicBool>) -> Self {
            Self {
                shape: Shape::builder()
                    .field("name", FieldType::String, "the person to greet")
                    .build()
                    .unwrap(),
                called,
            }
        }
    }

    #[async_trait]
    impl ToolHandler for ProbeTool {
        fn name(&self) -> &str {
            "probe"
        }

        fn description(&self) -> &str {
            "records invocation"
        }

        fn input_shape(&self) -> &Shape {
            &self.shape
        }

        async fn execute(&self, _ctx: ToolContext, _arguments: Value) -> ToolResult<CallToolResult> {
            self.called.store(true, Ordering::SeqCst);
            Ok(CallToolResult::text("probed"))
        }
    }

    struct PanicTool {
        shape: Shape,
    }

    #[async_trait]
    impl ToolHandler for PanicTool {
        fn name(&self) -> &str {
            "panics"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn input_shape(&self) -> &Shape {
            &self.shape
        }

        async fn execute(&self, _ctx: ToolContext, _arguments: Value) -> ToolResult<CallToolResult> {
            panic!("boom");
        }
    }

    struct FailingTool {
        shape: Shape,
    }

    #[async_trait]
    impl ToolHandler for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn input_shape(&self) -> &Shape {
            &self.shape
        }

        async fn execute(&self, _ctx: ToolContext, _arguments: Value) -> ToolResult<CallToolResult> {
            Err(ToolError::ExecutionFailed("backend unreachable".into()))
        }
    }

    struct StructuredTool {
        input_shape: Shape,
        output_shape: Shape,
    }

    #[async_trait]
    impl ToolHandler for StructuredTool {
        fn name(&self) -> &str {
            "structured"
        }

        fn description(&self) -> &str {
            "returns structured output"
        }

        fn input_shape(&self) -> &Shape {
            &self.input_shape
        }

        fn output_shape(&self) -> Option<&Shape> {
            Some(&self.output_shape)
        }

        async fn execute(&self, _ctx: ToolContext, _arguments: Value) -> ToolResult<CallToolResult> {
            // Declares greeting as a string but emits a number; the registry
            // logs the mismatch and passes the result through.
            Ok(CallToolResult::text("ok").with_structured(json!({"greeting": 7})))
        }
    }

    struct SleepyTool {
        shape: Shape,
    }

    #[async_trait]
    impl ToolHandler for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "suspends until cancelled"
        }

        fn input_shape(&self) -> &Shape {
            &self.shape
        }

        async fn execute(&self, ctx: ToolContext, _arguments: Value) -> ToolResult<CallToolResult> {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    Ok(CallToolResult::text("overslept"))
                }
                _ = ctx.cancelled() => Err(ToolError::Cancelled),
            }
        }
    }

    fn probe_registry() -> (ToolRegistry, Arc<AtomicBool>) {
        let registry = ToolRegistry::new();
        let called = Arc::new(AtomicBool::new(false));
        registry.register(ProbeTool::new(Arc::clone(&called))).unwrap();
        (registry, called)
    }

    #[test]
    fn test_register_then_lookup_round_trip() {
        let (registry, _) = probe_registry();

        let definition = registry.get("probe").unwrap().definition();
        assert_eq!(definition.name, "probe");
        assert_eq!(definition.description.as_deref(), Some("records invocation"));
        assert_eq!(definition.input_schema["properties"]["name"]["type"], "string");

        assert_eq!(registry.len(), 1);
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let (registry, first_called) = probe_registry();

        let second_called = Arc::new(AtomicBool::new(false));
        let err = registry
            .register(ProbeTool::new(Arc::clone(&second_called)))
            .unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "probe"));
        assert_eq!(registry.len(), 1);

        // The retained handler is the first one.
        let registered = registry.get("probe").unwrap();
        futures_block_on(registered.execute(ToolContext::detached(), json!({"name": "Ada"})));
        assert!(first_called.load(Ordering::SeqCst));
        assert!(!second_called.load(Ordering::SeqCst));
    }

    fn futures_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_not_found() {
        let (registry, _) = probe_registry();

        let result = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "missing".into(),
                    arguments: json!({}),
                },
            )
            .await;

        assert!(result.is_error());
        assert_eq!(result.error_kind(), Some(ErrorKind::ToolNotFound));

        // The registry keeps serving afterwards.
        let ok = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "probe".into(),
                    arguments: json!({"name": "Ada"}),
                },
            )
            .await;
        assert!(!ok.is_error());
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_handler() {
        let (registry, called) = probe_registry();

        let result = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "probe".into(),
                    arguments: json!({}),
                },
            )
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArguments));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let registry = ToolRegistry::new();
        registry
            .register(PanicTool {
                shape: Shape::empty(),
            })
            .unwrap();

        let result = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "panics".into(),
                    arguments: json!({}),
                },
            )
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InternalError));
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_failing_handler_reports_handler_error() {
        let registry = ToolRegistry::new();
        registry
            .register(FailingTool {
                shape: Shape::empty(),
            })
            .unwrap();

        let result = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "failing".into(),
                    arguments: json!({}),
                },
            )
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::HandlerError));
        match &result.content[0] {
            crate::protocol::ToolContent::Text { text } => {
                assert!(text.contains("backend unreachable"));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_output_shape_mismatch_passes_through() {
        let registry = ToolRegistry::new();
        registry
            .register(StructuredTool {
                input_shape: Shape::empty(),
                output_shape: Shape::builder()
                    .field("greeting", FieldType::String, "rendered greeting")
                    .build()
                    .unwrap(),
            })
            .unwrap();

        let result = registry
            .execute(
                ToolContext::detached(),
                CallToolParams {
                    name: "structured".into(),
                    arguments: json!({}),
                },
            )
            .await;

        // Mismatch is logged, not surfaced as an error.
        assert!(!result.is_error());
        assert_eq!(result.structured_content, Some(json!({"greeting": 7})));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_suspended_handler() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(SleepyTool {
                shape: Shape::empty(),
            })
            .unwrap();

        let shutdown = ShutdownToken::new();
        let ctx = ToolContext::new(shutdown.clone());
        let call_registry = Arc::clone(&registry);
        let call = tokio::spawn(async move {
            call_registry
                .execute(
                    ctx,
                    CallToolParams {
                        name: "sleepy".into(),
                        arguments: json!({}),
                    },
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("dispatch must observe cancellation promptly")
            .unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    }
}
