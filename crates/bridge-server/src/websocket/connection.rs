//! Per-connection state shared by the reader, writer and event pump.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message};
use bridge_core::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::protocol::ServerMessage;

/// A connected WebSocket client bound to one session.
pub struct ClientConnection {
    session_id: SessionId,
    /// Feeds the connection's writer task.
    tx: mpsc::Sender<Message>,
    connected_at: Instant,
    /// Whether the client has answered since the last heartbeat check.
    is_alive: AtomicBool,
    /// Last pong (or any inbound frame).
    last_seen: Mutex<Instant>,
    /// Frames queued for the writer.
    frames_sent: AtomicU64,
}

impl ClientConnection {
    /// Create a connection writing into `tx`.
    pub fn new(session_id: SessionId, tx: mpsc::Sender<Message>) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Session this connection serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Queue a frame, waiting for room if the writer is behind.
    ///
    /// Returns `false` once the writer is gone.
    pub async fn send(&self, message: &ServerMessage) -> bool {
        let sent = self
            .tx
            .send(Message::Text(message.to_json().into()))
            .await
            .is_ok();
        if sent {
            let _ = self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Queue a close frame; the writer stops after sending it.
    pub async fn close(&self, code: u16, reason: &str) -> bool {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        self.tx.send(Message::Close(Some(frame))).await.is_ok()
    }

    /// Frames queued so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the client was last heard from.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
