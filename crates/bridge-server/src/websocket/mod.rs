//! Socket transport: WebSocket upgrade, per-connection session loop and the
//! JSON frame protocol.

pub mod connection;
pub mod handler;
pub mod protocol;
pub mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bridge_core::{Bridge, ClientKind, TransportAdapter, TransportKind};
use serde::Deserialize;
use tracing::debug;

use crate::server::AppState;

/// Socket front-end of the bridge.
pub struct SocketAdapter {
    bridge: Arc<Bridge>,
    connections: AtomicUsize,
}

impl SocketAdapter {
    /// Create an adapter over `bridge`.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            connections: AtomicUsize::new(0),
        }
    }

    /// Open socket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_opened(&self) {
        let _ = self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        let _ = self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl TransportAdapter for SocketAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    /// Caller-chosen client identifier. Required.
    pub client_id: Option<String>,
    /// `ide` or `cli`; defaults to `cli`.
    pub client_kind: Option<String>,
}

impl ConnectQuery {
    /// Validate into a client ID and kind.
    pub fn resolve(self) -> Result<(String, ClientKind), String> {
        let client_id = self
            .client_id
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "clientId is required".to_owned())?;
        let kind = match self.client_kind.as_deref() {
            None | Some("") => ClientKind::Cli,
            Some(k) => k
                .parse::<ClientKind>()
                .map_err(|_| format!("invalid clientKind: {k}"))?,
        };
        Ok((client_id, kind))
    }
}

/// GET /ws?clientId=..&clientKind=..
pub async fn ws_handler(
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let (client_id, kind) = match query.resolve() {
        Ok(resolved) => resolved,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    debug!(client_id, %kind, "upgrading connection");
    let adapter = Arc::clone(&state.socket);
    let config = Arc::clone(&state.config);
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| session::run_ws_session(socket, client_id, kind, adapter, config))
}
