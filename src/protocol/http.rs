//! HTTP transport: JSON-RPC over POST requests.
//!
//! Accepts concurrent connections; each inbound request is mapped to a server
//! instance by a caller-supplied selector function, allowing multi-tenant
//! routing. Dispatch is serialized within one logical session (identified by
//! the `Mcp-Session-Id` header) and fully concurrent across sessions.

use crate::config::HttpConfig;
use crate::error::{TransportError, TransportResult};
use crate::protocol::handler::Handler;
use crate::protocol::server::McpServer;
use crate::protocol::types::{JsonRpcRequest, JsonRpcResponse};
use crate::shutdown::ShutdownToken;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Session id header carried by clients that want per-session ordering.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Maps an inbound request to the server instance that should handle it.
///
/// The demo always returns the same instance; a multi-tenant deployment can
/// route on headers (host, auth) instead.
pub type ServerSelector<H> = Arc<dyn Fn(&HeaderMap) -> Arc<McpServer<H>> + Send + Sync>;

/// Shared state for HTTP handlers.
pub struct AppState<H: Handler> {
    selector: ServerSelector<H>,
    // One lock per session with a request in flight; requests without a
    // session id get no lock and therefore no cross-request ordering
    // guarantee. Entries are evicted once uncontended so the header, which
    // is client-chosen, cannot grow the map without bound.
    sessions: DashMap<String, Arc<Mutex<()>>>,
}

/// HTTP transport for an MCP server.
pub struct HttpTransport<H: Handler> {
    config: HttpConfig,
    selector: ServerSelector<H>,
}

impl<H: Handler + 'static> HttpTransport<H> {
    pub fn new(config: HttpConfig, selector: ServerSelector<H>) -> Self {
        Self { config, selector }
    }

    /// Transport that routes every request to the one given server.
    pub fn single(config: HttpConfig, server: Arc<McpServer<H>>) -> Self {
        Self::new(config, Arc::new(move |_| Arc::clone(&server)))
    }

    /// The bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the router. Exposed separately so tests can drive it without
    /// binding a socket.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            selector: Arc::clone(&self.selector),
            sessions: DashMap::new(),
        });

        let mut app = Router::new()
            .route(&self.config.rpc_path, post(handle_rpc::<H>))
            .route("/health", get(health_check))
            .with_state(state);

        if self.config.enable_cors {
            use tower_http::cors::{Any, CorsLayer};
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app
    }

    /// Run the HTTP transport until the shutdown token fires.
    ///
    /// A bind failure is a fatal startup error reported to the caller; it is
    /// not retried.
    pub async fn run(self, shutdown: ShutdownToken) -> TransportResult<()> {
        let addr = self.address();
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!("Ready - listening on {} (JSON-RPC over HTTP)", addr);
        info!("  -> JSON-RPC: POST {}", self.config.rpc_path);
        info!("  -> Health:   GET /health");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(())
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[instrument(skip_all, fields(method = %request.method))]
async fn handle_rpc<H: Handler + 'static>(
    State(state): State<Arc<AppState<H>>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> axum::response::Response {
    let server = (state.selector)(&headers);

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let session_lock = session_id.as_ref().map(|id| {
        Arc::clone(
            &state
                .sessions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    });

    let is_notification = request.is_notification();

    // Hold the session lock across dispatch: strict ordering inside a
    // session, full concurrency across sessions.
    let response: JsonRpcResponse = {
        let _guard = match &session_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        server.handle(request).await
    };

    // Evict the session entry unless another request still holds the lock.
    drop(session_lock);
    if let Some(id) = session_id {
        state
            .sessions
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    if is_notification {
        return StatusCode::ACCEPTED.into_response();
    }
    (StatusCode::OK, Json(response)).into_response()
}
