//! Persistence/notification collaborator.
//!
//! The bridge tells the backend about lifecycle transitions and finished
//! commands. Backend failures are logged by the caller and never reach a
//! client.

use async_trait::async_trait;

use crate::command::CommandResult;
use crate::session::Session;

/// Error returned by a [`SessionBackend`].
#[derive(Debug, thiserror::Error)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

/// External collaborator notified of session activity.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// A session was admitted.
    async fn session_opened(&self, session: &Session) -> Result<(), BackendError>;

    /// A session reached `Closed`.
    async fn session_closed(&self, session: &Session) -> Result<(), BackendError>;

    /// A command produced its result.
    async fn command_completed(
        &self,
        session: &Session,
        command: &str,
        result: &CommandResult,
    ) -> Result<(), BackendError>;
}

/// Backend that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl SessionBackend for NoopBackend {
    async fn session_opened(&self, _session: &Session) -> Result<(), BackendError> {
        Ok(())
    }

    async fn session_closed(&self, _session: &Session) -> Result<(), BackendError> {
        Ok(())
    }

    async fn command_completed(
        &self,
        _session: &Session,
        _command: &str,
        _result: &CommandResult,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}
