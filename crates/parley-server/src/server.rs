//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_core::ConnectionId;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{ServerConfig, SessionSettings};
use crate::health::HealthResponse;
use crate::limits::ConnectionLimiter;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::rpc::context::RpcContext;
use crate::rpc::handlers::register_all;
use crate::rpc::registry::MethodRegistry;
use crate::service::ChatService;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Handler context (chat core and connection cap).
    pub ctx: Arc<RpcContext>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Per-connection knobs.
    pub session: SessionSettings,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The Parley chat server.
pub struct ParleyServer {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl ParleyServer {
    /// Create a server over a chat service. All RPC methods are registered.
    pub fn new(config: ServerConfig, chat: Arc<ChatService>, metrics: PrometheusHandle) -> Self {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        let connections = Arc::new(ConnectionLimiter::new(config.max_connections));
        Self {
            config,
            registry: Arc::new(registry),
            ctx: Arc::new(RpcContext::new(chat, connections)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            ctx: Arc::clone(&self.ctx),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            session: self.config.session_settings(),
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, max_connections = self.config.max_connections, "parley server listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            info!("parley server stopped");
        });
        Ok((addr, handle))
    }

    /// Chat core.
    pub fn chat(&self) -> &Arc<ChatService> {
        &self.ctx.chat
    }

    /// Connection cap.
    pub fn connections(&self) -> &Arc<ConnectionLimiter> {
        &self.ctx.connections
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }
}

/// GET /ws: upgrade if under the connection cap, otherwise 503.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.ctx.connections.try_acquire() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(max = state.ctx.connections.max(), "connection limit reached, rejecting upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let client_id = ConnectionId::new();
    let token = state.shutdown.session_token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                client_id,
                state.registry,
                state.ctx,
                state.session,
                token,
                permit,
            )
        })
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::snapshot(
        state.start_time.elapsed(),
        &state.ctx.chat,
        &state.ctx.connections,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
