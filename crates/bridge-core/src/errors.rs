//! Error taxonomy for the bridge core.

use crate::ids::SessionId;

// ── Error code constants ────────────────────────────────────────────

/// Command name is not registered.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
/// Operation referenced a session the manager has no record of.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Admission refused: too many concurrent sessions.
pub const SESSION_LIMIT_EXCEEDED: &str = "SESSION_LIMIT_EXCEEDED";
/// Session exists but no longer accepts new work.
pub const SESSION_NOT_ACTIVE: &str = "SESSION_NOT_ACTIVE";
/// The handler raised a fault.
pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
/// The handler ignored cancellation past the grace period.
pub const HANDLER_UNRESPONSIVE: &str = "HANDLER_UNRESPONSIVE";
/// Malformed wire input.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Session- and admission-level failures.
///
/// Command-level failures (`UnknownCommand`, handler faults, unresponsive
/// handlers) never surface as this type; they are folded into a
/// [`CommandResult`](crate::command::CommandResult) instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// No record of this session (closed, expired or never opened).
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session is Closing and refuses new commands.
    #[error("session is not active: {0}")]
    SessionNotActive(SessionId),

    /// Concurrent session limit reached; nothing was created.
    #[error("session limit exceeded (max {max})")]
    SessionLimitExceeded {
        /// Configured limit.
        max: usize,
    },

    /// Admission is switched off (shutdown in progress).
    #[error("bridge is not accepting sessions")]
    NotAccepting,
}

impl BridgeError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => SESSION_NOT_FOUND,
            Self::SessionNotActive(_) => SESSION_NOT_ACTIVE,
            Self::SessionLimitExceeded { .. } | Self::NotAccepting => SESSION_LIMIT_EXCEEDED,
        }
    }

    /// Whether a transport should report this as an expired session.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }
}

/// Fault raised by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// A parameter was missing or could not be decoded.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// The handler observed its cancellation token and gave up.
    #[error("command cancelled")]
    Cancelled,

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Shorthand for [`HandlerError::InvalidParameter`].
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}
