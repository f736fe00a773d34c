//! Contract shared by the transport adapters.
//!
//! An adapter translates one wire protocol into the four core operations.
//! Adapters hold only session IDs; all session state lives in the
//! [`Bridge`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::command::{CommandRequest, CommandResult, Parameters};
use crate::errors::BridgeError;
use crate::event::Event;
use crate::ids::SessionId;
use crate::session::{ClientKind, TransportKind};

/// Stream of events for one subscription. Dropping it unregisters the
/// subscription.
pub type EventStream = BoxStream<'static, Arc<Event>>;

/// One wire protocol's view of the bridge.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Which transport this adapter serves.
    fn transport(&self) -> TransportKind;

    /// The bridge this adapter drives.
    fn bridge(&self) -> &Bridge;

    /// Admit a client and return its session ID.
    async fn on_connect(
        &self,
        client_id: &str,
        client_kind: ClientKind,
    ) -> Result<SessionId, BridgeError> {
        let session = self
            .bridge()
            .open_session(client_id, client_kind, self.transport())
            .await?;
        Ok(session.id)
    }

    /// Execute one command in a session.
    async fn on_command(
        &self,
        session_id: &SessionId,
        command: &str,
        parameters: Parameters,
        correlation_id: Option<String>,
    ) -> Result<CommandResult, BridgeError> {
        let request = CommandRequest {
            session_id: session_id.clone(),
            command: command.to_owned(),
            parameters,
            correlation_id,
        };
        self.bridge().execute(request).await
    }

    /// Open a live event stream. It ends when the session closes.
    fn on_subscribe(
        &self,
        session_id: &SessionId,
        event_types: Vec<String>,
    ) -> Result<EventStream, BridgeError> {
        Ok(self.bridge().subscribe(session_id, event_types)?.into_stream())
    }

    /// The client went away; close its session. Idempotent.
    async fn on_disconnect(&self, session_id: &SessionId) -> bool {
        self.bridge().close_session(session_id).await
    }
}
