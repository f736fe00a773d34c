//! Session records and the [`SessionManager`], the source of truth for
//! which sessions exist.
//!
//! The table is a `DashMap` of per-session slots; each slot carries its own
//! mutex, so touching one session's metadata never blocks another session.
//! Locks are only held for the brief read/update of a record, never across
//! command execution or event delivery.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::EventBroadcaster;
use crate::errors::BridgeError;
use crate::ids::SessionId;

/// Kind of client on the other end of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// IDE plugin.
    Ide,
    /// Command-line tool.
    Cli,
}

impl ClientKind {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ide => "ide",
            Self::Cli => "cli",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ide" => Ok(Self::Ide),
            "cli" => Ok(Self::Cli),
            other => Err(format!("unknown client kind: {other}")),
        }
    }
}

/// Transport a session was opened over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Message-based socket (WebSocket).
    Socket,
    /// Remote procedure calls (gRPC).
    Rpc,
}

impl TransportKind {
    /// Lowercase name used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Rpc => "rpc",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness state machine: `Active → Closing → Closed`, or `Active → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Accepting commands and events.
    Active,
    /// Graceful shutdown requested; in-flight commands may finish.
    Closing,
    /// Terminal.
    Closed,
}

/// Snapshot of one session.
///
/// Adapters only ever hold the [`SessionId`] plus snapshots like this one;
/// the canonical record lives inside the [`SessionManager`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Caller-supplied client identifier.
    pub client_id: String,
    /// IDE or CLI.
    pub client_kind: ClientKind,
    /// Socket or RPC.
    pub transport: TransportKind,
    /// When the session was opened.
    pub created_at: DateTime<Utc>,
    /// When the session last ran a command or changed subscriptions.
    pub last_activity: DateTime<Utc>,
    /// Subscribed event types.
    pub subscriptions: BTreeSet<String>,
    /// Liveness state.
    pub state: Liveness,
}

impl Session {
    /// Whether the session accepts new commands.
    pub fn is_active(&self) -> bool {
        self.state == Liveness::Active
    }
}

struct SessionSlot {
    record: Mutex<Session>,
    last_active: Mutex<Instant>,
    cancel: CancellationToken,
}

impl SessionSlot {
    fn touch(&self) -> Session {
        *self.last_active.lock() = Instant::now();
        let mut record = self.record.lock();
        record.last_activity = Utc::now();
        record.clone()
    }
}

/// Owns every live session.
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    broadcaster: Arc<EventBroadcaster>,
    max_sessions: usize,
    admitted: AtomicUsize,
    accepting: AtomicBool,
}

impl SessionManager {
    /// Create a manager admitting at most `max_sessions` concurrent sessions.
    pub fn new(max_sessions: usize, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            sessions: DashMap::new(),
            broadcaster,
            max_sessions: max_sessions.max(1),
            admitted: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
        }
    }

    /// Open a new Active session.
    ///
    /// Fails with [`BridgeError::SessionLimitExceeded`] when the limit is
    /// reached and [`BridgeError::NotAccepting`] after [`stop_accepting`];
    /// in both cases nothing is created.
    ///
    /// [`stop_accepting`]: Self::stop_accepting
    pub fn open(
        &self,
        client_id: impl Into<String>,
        client_kind: ClientKind,
        transport: TransportKind,
    ) -> Result<Session, BridgeError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(BridgeError::NotAccepting);
        }
        let max = self.max_sessions;
        if self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            counter!("bridge_sessions_rejected_total").increment(1);
            warn!(max, "session limit reached, rejecting open");
            return Err(BridgeError::SessionLimitExceeded { max });
        }

        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            client_id: client_id.into(),
            client_kind,
            transport,
            created_at: now,
            last_activity: now,
            subscriptions: BTreeSet::new(),
            state: Liveness::Active,
        };
        let slot = Arc::new(SessionSlot {
            record: Mutex::new(session.clone()),
            last_active: Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        });
        let _ = self.sessions.insert(session.id.clone(), slot);

        counter!("bridge_sessions_opened_total", "transport" => transport.as_str()).increment(1);
        gauge!("bridge_sessions_active").increment(1.0);
        info!(
            session_id = %session.id,
            client_id = session.client_id,
            client_kind = %client_kind,
            transport = %transport,
            "session opened"
        );
        Ok(session)
    }

    fn slot(&self, session_id: &SessionId) -> Result<Arc<SessionSlot>, BridgeError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BridgeError::SessionNotFound(session_id.clone()))
    }

    /// Snapshot of a session.
    pub fn get(&self, session_id: &SessionId) -> Result<Session, BridgeError> {
        Ok(self.slot(session_id)?.record.lock().clone())
    }

    /// Record activity on a session and return its snapshot.
    pub fn touch(&self, session_id: &SessionId) -> Result<Session, BridgeError> {
        Ok(self.slot(session_id)?.touch())
    }

    /// Session-scoped cancellation token; cancelled when the session closes.
    pub fn cancellation_token(&self, session_id: &SessionId) -> Result<CancellationToken, BridgeError> {
        Ok(self.slot(session_id)?.cancel.clone())
    }

    /// Add event types to the session's subscription set.
    ///
    /// Idempotent: already-subscribed types are left as they are.
    pub fn subscribe<I, S>(&self, session_id: &SessionId, event_types: I) -> Result<Session, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.slot(session_id)?;
        {
            let mut record = slot.record.lock();
            for t in event_types {
                let _ = record.subscriptions.insert(t.into());
            }
        }
        Ok(slot.touch())
    }

    /// Remove event types from the session's subscription set.
    pub fn unsubscribe<I, S>(&self, session_id: &SessionId, event_types: I) -> Result<Session, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slot = self.slot(session_id)?;
        {
            let mut record = slot.record.lock();
            for t in event_types {
                let _ = record.subscriptions.remove(t.as_ref());
            }
        }
        Ok(slot.touch())
    }

    /// Drop event types from the session's set unless a registered
    /// subscription of the session still delivers them.
    pub fn release_event_types<I, S>(&self, session_id: &SessionId, event_types: I) -> Result<Session, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slot = self.slot(session_id)?;
        {
            let mut record = slot.record.lock();
            let held: BTreeSet<String> = self
                .broadcaster
                .session_subscriptions(session_id)
                .iter()
                .flat_map(|sub| sub.event_types())
                .collect();
            for t in event_types {
                if !held.contains(t.as_ref()) {
                    let _ = record.subscriptions.remove(t.as_ref());
                }
            }
        }
        Ok(slot.touch())
    }

    /// Request a graceful close: `Active → Closing`.
    ///
    /// Event delivery to the session stops immediately; commands already
    /// running may finish, new ones are refused.
    pub fn begin_close(&self, session_id: &SessionId) -> Result<(), BridgeError> {
        let slot = self.slot(session_id)?;
        {
            let mut record = slot.record.lock();
            if record.state == Liveness::Active {
                record.state = Liveness::Closing;
                debug!(session_id = %session_id, "session closing");
            }
        }
        let _ = self.broadcaster.deregister(session_id);
        Ok(())
    }

    /// Close a session: `Active | Closing → Closed`.
    ///
    /// Removes it from the table, cancels its token and deregisters it from
    /// the broadcaster. Returns the final snapshot, or `None` if there was
    /// nothing to close.
    pub fn close(&self, session_id: &SessionId) -> Option<Session> {
        let (_, slot) = self.sessions.remove(session_id)?;
        let snapshot = {
            let mut record = slot.record.lock();
            record.state = Liveness::Closed;
            record.clone()
        };
        slot.cancel.cancel();
        let _ = self.broadcaster.deregister(session_id);
        let _ = self.admitted.fetch_sub(1, Ordering::AcqRel);
        gauge!("bridge_sessions_active").decrement(1.0);
        info!(session_id = %session_id, "session closed");
        Some(snapshot)
    }

    /// Close every session. Returns their final snapshots.
    pub fn close_all(&self) -> Vec<Session> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.close(id)).collect()
    }

    /// Close sessions idle for longer than `max_idle`. Returns their final
    /// snapshots.
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<Session> {
        let idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| e.value().last_active.lock().elapsed() > max_idle)
            .map(|e| e.key().clone())
            .collect();
        let reaped: Vec<Session> = idle.iter().filter_map(|id| self.close(id)).collect();
        if !reaped.is_empty() {
            info!(count = reaped.len(), "reaped idle sessions");
        }
        reaped
    }

    /// Snapshots of all live sessions.
    pub fn list(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|e| e.value().record.lock().clone())
            .collect()
    }

    /// Number of Active or Closing sessions.
    pub fn active_count(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    /// Configured session limit.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Whether a new session would currently be admitted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && self.active_count() < self.max_sessions
    }

    /// Whether admission is switched on, regardless of capacity.
    pub fn admission_open(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop admitting new sessions.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Resume admitting new sessions.
    pub fn resume_accepting(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    /// Broadcaster the manager deregisters closed sessions from.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }
}
