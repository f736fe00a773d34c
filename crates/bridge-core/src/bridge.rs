//! The [`Bridge`]: transport-agnostic session API shared by every adapter.
//!
//! A `Bridge` is an explicitly constructed value. Nothing in this crate is a
//! process-wide singleton, so several bridges can coexist (tests do this a
//! lot).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::backend::{NoopBackend, SessionBackend};
use crate::broadcast::{EventBroadcaster, Subscription, SubscriptionGuard};
use crate::command::{CommandContext, CommandRequest, CommandResult, Parameters};
use crate::errors::{BridgeError, HandlerError};
use crate::event::Event;
use crate::ids::SessionId;
use crate::registry::{CommandHandler, CommandRegistry};
use crate::session::{ClientKind, Session, SessionManager, TransportKind};

/// How long handlers may run and how long they get to react to
/// cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Budget for one handler invocation before its token is cancelled.
    pub handler_timeout: Duration,
    /// Time a cancelled handler has to return before it is abandoned.
    pub cancel_grace: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(60),
            cancel_grace: Duration::from_millis(2000),
        }
    }
}

/// Construction parameters for a [`Bridge`].
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Concurrent session limit.
    pub max_sessions: usize,
    /// Bound of each subscription's event queue.
    pub event_queue_capacity: usize,
    /// Handler timing.
    pub execution: ExecutionPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            event_queue_capacity: 256,
            execution: ExecutionPolicy::default(),
        }
    }
}

/// Core facade: sessions, commands and events.
pub struct Bridge {
    registry: Arc<CommandRegistry>,
    sessions: Arc<SessionManager>,
    broadcaster: Arc<EventBroadcaster>,
    backend: Arc<dyn SessionBackend>,
    policy: ExecutionPolicy,
}

impl Bridge {
    /// Build a bridge around `registry` with a no-op backend.
    pub fn new(config: &BridgeConfig, registry: Arc<CommandRegistry>) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new(config.event_queue_capacity));
        let sessions = Arc::new(SessionManager::new(
            config.max_sessions,
            Arc::clone(&broadcaster),
        ));
        Self {
            registry,
            sessions,
            broadcaster,
            backend: Arc::new(NoopBackend),
            policy: config.execution,
        }
    }

    /// Replace the persistence/notification backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Command registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Event broadcaster.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Handler timing policy.
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Admit a new session.
    pub async fn open_session(
        &self,
        client_id: impl Into<String>,
        client_kind: ClientKind,
        transport: TransportKind,
    ) -> Result<Session, BridgeError> {
        let session = self.sessions.open(client_id, client_kind, transport)?;
        if let Err(e) = self.backend.session_opened(&session).await {
            warn!(session_id = %session.id, error = %e, "backend rejected session_opened");
        }
        Ok(session)
    }

    /// Snapshot of a session.
    pub fn session(&self, session_id: &SessionId) -> Result<Session, BridgeError> {
        self.sessions.get(session_id)
    }

    /// Run a command to completion.
    ///
    /// Returns `Err` only for session-level failures (unknown or closing
    /// session). Everything that goes wrong inside the command, including an
    /// unknown name, is folded into the returned [`CommandResult`].
    #[instrument(skip_all, fields(session_id = %request.session_id, command = %request.command))]
    pub async fn execute(&self, request: CommandRequest) -> Result<CommandResult, BridgeError> {
        let session = self.sessions.touch(&request.session_id)?;
        if !session.is_active() {
            return Err(BridgeError::SessionNotActive(session.id));
        }
        let session_token = self.sessions.cancellation_token(&session.id)?;

        let CommandRequest {
            session_id,
            command,
            parameters,
            correlation_id,
        } = request;

        counter!("bridge_commands_total", "command" => command.clone()).increment(1);
        let start = Instant::now();

        let result = match self.registry.resolve(&command) {
            None => {
                debug!("unknown command");
                CommandResult::unknown_command(&command)
            }
            Some(handler) => {
                let cancel = session_token.child_token();
                let ctx = CommandContext {
                    session: session.clone(),
                    correlation_id: correlation_id.clone(),
                    cancel: cancel.clone(),
                };
                self.run_handler(&command, handler, ctx, parameters, cancel)
                    .await
            }
        }
        .with_correlation_id(correlation_id);

        let duration = start.elapsed();
        histogram!("bridge_command_duration_seconds", "command" => command.clone())
            .record(duration.as_secs_f64());
        if let Some(code) = result.error_code() {
            counter!(
                "bridge_command_errors_total",
                "command" => command.clone(),
                "code" => code.to_owned()
            )
            .increment(1);
        }
        if duration.as_secs() >= 5 {
            warn!(duration_secs = duration.as_secs_f64(), "slow command");
        }

        let _ = self.sessions.touch(&session_id);
        if let Err(e) = self.backend.command_completed(&session, &command, &result).await {
            warn!(error = %e, "backend rejected command_completed");
        }
        Ok(result)
    }

    async fn run_handler(
        &self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
        ctx: CommandContext,
        params: Parameters,
        cancel: CancellationToken,
    ) -> CommandResult {
        let mut fut = AssertUnwindSafe(handler.handle(ctx, params)).catch_unwind();

        let finished = tokio::select! {
            out = &mut fut => Some(out),
            () = tokio::time::sleep(self.policy.handler_timeout) => {
                warn!(timeout = ?self.policy.handler_timeout, "handler timed out, cancelling");
                None
            }
            () = cancel.cancelled() => {
                debug!("session closed during command, cancelling");
                None
            }
        };

        let outcome = match finished {
            Some(out) => out,
            None => {
                cancel.cancel();
                match tokio::time::timeout(self.policy.cancel_grace, &mut fut).await {
                    Ok(out) => out,
                    Err(_elapsed) => {
                        error!(grace = ?self.policy.cancel_grace, "handler ignored cancellation");
                        return CommandResult::handler_unresponsive(command);
                    }
                }
            }
        };

        match outcome {
            Ok(Ok(payload)) => CommandResult::success(payload),
            Ok(Err(err)) => {
                debug!(error = %err, "handler failed");
                CommandResult::handler_failed(&err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = message, "handler panicked");
                CommandResult::handler_failed(&HandlerError::failed(format!(
                    "handler panicked: {message}"
                )))
            }
        }
    }

    /// Open an event stream for `event_types` on a session.
    ///
    /// The types are added to the session's subscription set. The returned
    /// guard unregisters the subscription when dropped and takes its types
    /// back out of the session's set unless another stream still delivers
    /// them. The stream also ends when the session closes.
    pub fn subscribe<I, S>(
        &self,
        session_id: &SessionId,
        event_types: I,
    ) -> Result<SubscriptionGuard, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = event_types.into_iter().map(Into::into).collect();
        let session = self.sessions.get(session_id)?;
        if !session.is_active() {
            return Err(BridgeError::SessionNotActive(session.id));
        }
        let _ = self.sessions.subscribe(session_id, types.iter().cloned())?;
        let sessions = Arc::clone(&self.sessions);
        let guard = self
            .broadcaster
            .subscribe(session_id, types)
            .on_release(move |sub: &Subscription| {
                let _ = sessions.release_event_types(sub.session_id(), sub.event_types());
            });

        // begin_close may have deregistered the session before this registration.
        let session = self.sessions.get(session_id)?;
        if !session.is_active() {
            return Err(BridgeError::SessionNotActive(session.id));
        }
        Ok(guard)
    }

    /// Add event types to a live subscription and to its session's set.
    pub fn extend_subscription(
        &self,
        subscription: &Subscription,
        event_types: &[String],
    ) -> Result<Session, BridgeError> {
        let session = self.sessions.get(subscription.session_id())?;
        if !session.is_active() {
            return Err(BridgeError::SessionNotActive(session.id));
        }
        let session = self
            .sessions
            .subscribe(subscription.session_id(), event_types.iter().cloned())?;
        subscription.add_event_types(event_types.iter().cloned());
        Ok(session)
    }

    /// Remove event types from a live subscription, and from its session's
    /// set unless another subscription of the session still holds them.
    pub fn retract_subscription(
        &self,
        subscription: &Subscription,
        event_types: &[String],
    ) -> Result<Session, BridgeError> {
        let _ = self.sessions.get(subscription.session_id())?;
        subscription.remove_event_types(event_types);
        self.sessions
            .release_event_types(subscription.session_id(), event_types)
    }

    /// Publish an event. Returns the number of subscriptions it reached.
    pub fn publish(&self, event: Event) -> usize {
        self.broadcaster.publish(event)
    }

    /// Stop event fan-out and refuse new commands on a session.
    pub fn begin_close(&self, session_id: &SessionId) -> Result<(), BridgeError> {
        self.sessions.begin_close(session_id)
    }

    /// Close a session. Idempotent; returns whether anything was closed.
    pub async fn close_session(&self, session_id: &SessionId) -> bool {
        let Some(closed) = self.sessions.close(session_id) else {
            return false;
        };
        self.notify_closed(&closed).await;
        true
    }

    /// Close sessions idle longer than `max_idle`. Returns how many closed.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let reaped = self.sessions.reap_idle(max_idle);
        for session in &reaped {
            self.notify_closed(session).await;
        }
        reaped.len()
    }

    /// Stop admission and close every session.
    pub async fn shutdown(&self) -> usize {
        self.sessions.stop_accepting();
        let closed = self.sessions.close_all();
        for session in &closed {
            self.notify_closed(session).await;
        }
        closed.len()
    }

    /// Whether a new session would currently be admitted.
    pub fn is_accepting_sessions(&self) -> bool {
        self.sessions.is_accepting()
    }

    async fn notify_closed(&self, session: &Session) {
        if let Err(e) = self.backend.session_closed(session).await {
            warn!(session_id = %session.id, error = %e, "backend rejected session_closed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
