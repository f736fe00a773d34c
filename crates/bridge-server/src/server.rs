//! `BridgeServer`: axum HTTP/WebSocket listener plus the tonic RPC listener
//! over one shared [`Bridge`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bridge_core::Bridge;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthCounters, HealthResponse};
use crate::reaper::spawn_reaper;
use crate::rpc::{self, RpcAdapter};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::{SocketAdapter, ws_handler};

/// Errors starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bridge both transports drive.
    pub bridge: Arc<Bridge>,
    /// Socket adapter (connection count lives here).
    pub socket: Arc<SocketAdapter>,
    /// Listener and connection settings.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// Running listeners.
pub struct ServerHandle {
    /// Bound HTTP/WebSocket address.
    pub http_addr: SocketAddr,
    /// Bound gRPC address.
    pub rpc_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

/// The bridge server.
pub struct BridgeServer {
    config: Arc<ServerConfig>,
    bridge: Arc<Bridge>,
    socket: Arc<SocketAdapter>,
    rpc: Arc<RpcAdapter>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl BridgeServer {
    /// Create a server over `bridge`.
    pub fn new(config: ServerConfig, bridge: Arc<Bridge>) -> Self {
        Self {
            config: Arc::new(config),
            socket: Arc::new(SocketAdapter::new(Arc::clone(&bridge))),
            rpc: Arc::new(RpcAdapter::new(Arc::clone(&bridge))),
            bridge,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: Arc::clone(&self.bridge),
            socket: Arc::clone(&self.socket),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind both listeners and start serving.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let http_listener = bind(&self.config.host, self.config.port).await?;
        let rpc_listener = bind(&self.config.host, self.config.rpc_port).await?;
        let http_addr = local_addr(&http_listener)?;
        let rpc_addr = local_addr(&rpc_listener)?;

        let router = self.router();
        let token = self.shutdown.token();
        let http_task = tokio::spawn(async move {
            let serve = axum::serve(http_listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http listener failed");
            }
        });

        let adapter = Arc::clone(&self.rpc);
        let max_message_size = self.config.max_message_size;
        let token = self.shutdown.token();
        let rpc_task = tokio::spawn(async move {
            if let Err(e) = rpc::serve(rpc_listener, adapter, max_message_size, token).await {
                error!(error = %e, "rpc listener failed");
            }
        });

        let mut tasks = vec![http_task, rpc_task];
        if let Some(max_idle) = self.config.idle_timeout() {
            tasks.push(spawn_reaper(
                Arc::clone(&self.bridge),
                max_idle,
                self.config.reap_interval(),
                self.shutdown.token(),
            ));
        }

        info!(%http_addr, %rpc_addr, "bridge server listening");
        Ok(ServerHandle {
            http_addr,
            rpc_addr,
            tasks,
        })
    }

    /// Close every session, stop both listeners and wait for them.
    pub async fn shutdown(&self, handle: ServerHandle) -> ShutdownReport {
        info!("shutting down bridge server");
        self.shutdown
            .graceful_shutdown(
                &self.bridge,
                handle.tasks,
                Some(self.config.shutdown_timeout()),
            )
            .await
    }

    /// The shared bridge.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The socket adapter.
    pub fn socket(&self) -> &Arc<SocketAdapter> {
        &self.socket
    }

    /// The RPC adapter.
    pub fn rpc(&self) -> &Arc<RpcAdapter> {
        &self.rpc
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, ServerError> {
    listener.local_addr().map_err(|source| ServerError::Bind {
        addr: "listener".into(),
        source,
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.bridge.sessions();
    let counters = HealthCounters {
        admitting: sessions.admission_open() && !state.shutdown.is_shutting_down(),
        accepting_sessions: state.bridge.is_accepting_sessions(),
        active_sessions: sessions.active_count(),
        subscriptions: state.bridge.broadcaster().subscription_count(),
        connections: state.socket.connection_count(),
    };
    Json(health::health_check(state.start_time, counters))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use bridge_core::{BridgeConfig, ClientKind, CommandRegistry, TransportKind};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> BridgeServer {
        let bridge = Arc::new(Bridge::new(
            &BridgeConfig::default(),
            CommandRegistry::with_builtins(),
        ));
        BridgeServer::new(ServerConfig::default(), bridge)
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown_coordinator().is_shutting_down());
        assert_eq!(server.socket().connection_count(), 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let _ = server
            .bridge()
            .open_session("c", ClientKind::Cli, TransportKind::Rpc)
            .await
            .unwrap();
        let parsed = get_json(server.router(), "/health").await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["acceptingSessions"], true);
        assert_eq!(parsed["activeSessions"], 1);
        assert_eq!(parsed["subscriptions"], 0);
        assert!(parsed["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining_once_admission_stops() {
        let server = make_server();
        server.bridge().sessions().stop_accepting();
        let parsed = get_json(server.router(), "/health").await;
        assert_eq!(parsed["status"], "draining");
        assert_eq!(parsed["acceptingSessions"], false);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_prometheus_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_without_recorder_is_unavailable() {
        let server = make_server();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_ports_and_shuts_down() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.http_addr.port(), 0);
        assert_ne!(handle.rpc_addr.port(), 0);
        let report = server.shutdown(handle).await;
        assert!(!report.timed_out);
        assert!(server.shutdown_coordinator().is_shutting_down());
    }
}
