//! Command request/result types and the per-execution handler context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{self, HandlerError};
use crate::ids::SessionId;
use crate::session::Session;

/// Wire-level parameters: string keys, string values, keys unique.
pub type Parameters = BTreeMap<String, String>;

/// A single unit of work submitted within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Session the command runs in.
    pub session_id: SessionId,
    /// Registered command name.
    pub command: String,
    /// Parameter mapping.
    #[serde(default)]
    pub parameters: Parameters,
    /// Caller-supplied correlation id, echoed on the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CommandRequest {
    /// Build a request with no parameters.
    pub fn new(session_id: SessionId, command: impl Into<String>) -> Self {
        Self {
            session_id,
            command: command.into(),
            parameters: Parameters::new(),
            correlation_id: None,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.parameters.insert(key.into(), value.into());
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Outcome status of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Handler returned a value.
    Success,
    /// Command failed; see [`CommandResult::error`].
    Error,
}

/// Why a command failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    /// Machine-readable code (`UNKNOWN_COMMAND`, `HANDLER_ERROR`, ...).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Exactly one of these is produced per [`CommandRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Success or error.
    pub status: CommandStatus,
    /// Handler-defined payload (present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Failure details (present on error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandFailure>,
    /// Echo of the request's correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CommandResult {
    /// Successful result carrying `payload`.
    pub fn success(payload: Value) -> Self {
        Self {
            status: CommandStatus::Success,
            payload: Some(payload),
            error: None,
            correlation_id: None,
        }
    }

    /// Failed result with a code and message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            payload: None,
            error: Some(CommandFailure {
                code: code.into(),
                message: message.into(),
            }),
            correlation_id: None,
        }
    }

    /// The "unknown command" result.
    pub fn unknown_command(name: &str) -> Self {
        Self::error(errors::UNKNOWN_COMMAND, format!("Unknown command: {name}"))
    }

    /// Wrap a handler fault.
    pub fn handler_failed(err: &HandlerError) -> Self {
        Self::error(errors::HANDLER_ERROR, err.to_string())
    }

    /// The handler ignored cancellation past the grace period.
    pub fn handler_unresponsive(name: &str) -> Self {
        Self::error(
            errors::HANDLER_UNRESPONSIVE,
            format!("handler unresponsive: {name}"),
        )
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Whether the status is success.
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    /// Error code, if failed.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// Error message, if failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// What a handler sees of the session it runs in.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Snapshot of the session taken when the command started.
    pub session: Session,
    /// Correlation id of the request, if any.
    pub correlation_id: Option<String>,
    /// Cancelled on timeout or session close. Long-running handlers must
    /// watch it.
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Session the command runs in.
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Look up a required parameter.
pub fn required_param<'a>(params: &'a Parameters, name: &str) -> Result<&'a str, HandlerError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::invalid(name, "required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_result() {
        let r = CommandResult::success(json!({"x": 1}));
        assert!(r.is_success());
        assert_eq!(r.payload.unwrap()["x"], 1);
        assert!(r.error.is_none());
    }

    #[test]
    fn unknown_command_message() {
        let r = CommandResult::unknown_command("doesnotexist");
        assert!(!r.is_success());
        assert_eq!(r.error_code(), Some(errors::UNKNOWN_COMMAND));
        assert!(r.error_message().unwrap().contains("Unknown command: doesnotexist"));
    }

    #[test]
    fn handler_failed_wraps_message() {
        let r = CommandResult::handler_failed(&HandlerError::failed("boom"));
        assert_eq!(r.error_code(), Some(errors::HANDLER_ERROR));
        assert_eq!(r.error_message(), Some("boom"));
    }

    #[test]
    fn correlation_id_roundtrip_on_wire() {
        let r = CommandResult::success(json!(true)).with_correlation_id(Some("c-9".into()));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["correlationId"], "c-9");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn request_builder() {
        let req = CommandRequest::new(SessionId::from("sess_1"), "validate")
            .with_param("content", "{}")
            .with_param("content", "[]")
            .with_correlation_id("r1");
        assert_eq!(req.parameters.len(), 1);
        assert_eq!(req.parameters["content"], "[]");
        assert_eq!(req.correlation_id.as_deref(), Some("r1"));
    }

    #[test]
    fn required_param_missing() {
        let params = Parameters::new();
        let err = required_param(&params, "content").unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParameter { .. }));
    }
}
