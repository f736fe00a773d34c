//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use bridge_core::errors::INVALID_MESSAGE;
use bridge_core::{ClientKind, TransportAdapter};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::SocketAdapter;
use super::connection::ClientConnection;
use super::handler::handle_text;
use super::protocol::{ProtocolError, ServerMessage};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long teardown waits for queued frames to reach the client.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a WebSocket session for a connected client.
///
/// 1. Opens a bridge session; on refusal sends an `error` frame and closes
/// 2. Sends a `session` frame with the new session ID
/// 3. Pumps subscribed events to the client
/// 4. Dispatches inbound frames one at a time
/// 5. Pings on an interval and drops clients that stay silent
/// 6. Closes the session on disconnect
#[instrument(skip_all, fields(client_id = %client_id, session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    client_kind: ClientKind,
    adapter: Arc<SocketAdapter>,
    config: Arc<ServerConfig>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let session_id = match adapter.on_connect(&client_id, client_kind).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "session refused");
            let frame = ServerMessage::Error {
                code: e.code().to_owned(),
                error: e.to_string(),
            };
            let _ = ws_tx.send(Message::Text(frame.to_json().into())).await;
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: e.code().to_owned().into(),
                })))
                .await;
            return;
        }
    };
    let _ = tracing::Span::current().record("session_id", session_id.as_str());

    let bridge = adapter.bridge();
    let opened = bridge.session(&session_id);
    let guard = bridge.subscribe(&session_id, Vec::<String>::new());
    let session_token = bridge.sessions().cancellation_token(&session_id);
    let (session, guard, session_token) = match (opened, guard, session_token) {
        (Ok(s), Ok(g), Ok(t)) => (s, g, t),
        _ => {
            // Closed between admission and setup.
            let _ = adapter.on_disconnect(&session_id).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let subscription = Arc::clone(guard.subscription());

    let connected_at = Instant::now();
    adapter.connection_opened();
    info!(kind = %client_kind, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (send_tx, send_rx) = mpsc::channel::<Message>(config.outbound_buffer.max(1));
    let connection = Arc::new(ClientConnection::new(session_id.clone(), send_tx));

    // Greeting goes straight to the socket, ahead of anything the pump queues.
    let greeting = ServerMessage::session(&session);
    if ws_tx.send(Message::Text(greeting.to_json().into())).await.is_err() {
        debug!("client went away before greeting");
    }

    let writer_done = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        config.heartbeat_interval(),
        config.heartbeat_timeout(),
        writer_done.clone(),
    ));

    let mut pump = {
        let connection = Arc::clone(&connection);
        tokio::spawn(async move {
            while let Some(event) = guard.next().await {
                if !connection.send(&ServerMessage::event(&event)).await {
                    break;
                }
            }
        })
    };

    let mut closed_by_server = false;
    loop {
        tokio::select! {
            () = session_token.cancelled() => {
                closed_by_server = true;
                break;
            }
            () = writer_done.cancelled() => break,
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                connection.mark_alive();
                let text = match msg {
                    Message::Text(t) => t.as_str().to_owned(),
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(s) => s.to_owned(),
                        Err(_) => {
                            let reply = ServerMessage::reply_error(
                                None,
                                INVALID_MESSAGE,
                                ProtocolError::NotUtf8.to_string(),
                            );
                            if !connection.send(&reply).await {
                                break;
                            }
                            continue;
                        }
                    },
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let outcome = handle_text(&text, adapter.as_ref(), &session_id, &subscription).await;
                if !connection.send(&outcome.reply).await || outcome.close {
                    break;
                }
            }
        }
    }

    if closed_by_server {
        info!("session closed by server");
        let _ = connection
            .send(&ServerMessage::SessionClosed {
                session_id: session_id.clone(),
            })
            .await;
    }
    let _ = adapter.on_disconnect(&session_id).await;

    // The pump ends once the subscription closes with the session.
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut pump).await.is_err() {
        pump.abort();
    }
    let close = connection.close(close_code::NORMAL, "session closed");
    let _ = tokio::time::timeout(FLUSH_TIMEOUT, close).await;
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    adapter.connection_closed();
    info!(frames = connection.frames_sent(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connected_at.elapsed().as_secs_f64());
}

/// Forward queued frames to the socket and run the heartbeat.
///
/// Exits after a close frame, on a send failure, or when the client has been
/// silent longer than `timeout`. Cancels `done` on exit.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    done: CancellationToken,
) {
    let _done = done.drop_guard();
    let mut ping_interval = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let is_close = matches!(msg, Message::Close(_));
                if ws_tx.send(msg).await.is_err() || is_close {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_seen_elapsed() > timeout {
                    warn!(session_id = %connection.session_id(), "client unresponsive for {timeout:?}, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

