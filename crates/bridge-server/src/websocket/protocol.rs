//! JSON wire protocol of the socket transport.
//!
//! Inbound frames are commands, subscription changes or a close request.
//! Every outbound frame carries a `type` discriminator so clients can tell
//! command replies from pushed events.

use bridge_core::{ClientKind, CommandResult, CommandStatus, Event, Parameters, Session, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why an inbound frame could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON, or JSON of the wrong shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent or empty.
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    /// `type` names nothing we understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// Binary frame that is not UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Run a command.
    Command {
        /// Client-chosen id echoed on the reply.
        id: Option<String>,
        /// Command name.
        command: String,
        /// Parameters, stringified.
        parameters: Parameters,
    },
    /// Add event types to the connection's subscription.
    Subscribe {
        /// Types to add.
        event_types: Vec<String>,
    },
    /// Remove event types from the connection's subscription.
    Unsubscribe {
        /// Types to remove.
        event_types: Vec<String>,
    },
    /// Close the session and the connection.
    Close,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Inbound {
    #[serde(rename = "type")]
    kind: Option<String>,
    command: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
    id: Option<Value>,
    #[serde(default)]
    event_types: Vec<String>,
}

/// Parse one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let raw: Inbound = serde_json::from_str(text)?;
    match raw.kind.as_deref() {
        None | Some("command") => {
            let command = raw
                .command
                .filter(|c| !c.is_empty())
                .ok_or(ProtocolError::MissingField("command"))?;
            let parameters = raw
                .parameters
                .into_iter()
                .map(|(k, v)| (k, parameter_text(v)))
                .collect();
            Ok(ClientMessage::Command {
                id: raw.id.and_then(id_text),
                command,
                parameters,
            })
        }
        Some("subscribe") => Ok(ClientMessage::Subscribe {
            event_types: non_empty(raw.event_types)?,
        }),
        Some("unsubscribe") => Ok(ClientMessage::Unsubscribe {
            event_types: non_empty(raw.event_types)?,
        }),
        Some("close") => Ok(ClientMessage::Close),
        Some(other) => Err(ProtocolError::UnknownType(other.to_owned())),
    }
}

fn non_empty(types: Vec<String>) -> Result<Vec<String>, ProtocolError> {
    if types.is_empty() {
        Err(ProtocolError::MissingField("eventTypes"))
    } else {
        Ok(types)
    }
}

/// Parameters are strings on the wire; other JSON values are passed through
/// as their JSON text for the handler to decode.
fn parameter_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn id_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An outbound frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once after the session is admitted.
    Session {
        /// New session ID.
        session_id: SessionId,
        /// Echo of the client ID.
        client_id: String,
        /// Echo of the client kind.
        client_kind: ClientKind,
        /// RFC 3339 creation time.
        created_at: String,
    },
    /// Answer to one inbound frame.
    Reply {
        /// Client-chosen id, if the request had one.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// `success` or `error`.
        status: CommandStatus,
        /// Handler payload on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error code on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Error message on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Subscription extended.
    Subscribed {
        /// Types now delivered, sorted.
        event_types: Vec<String>,
    },
    /// Subscription narrowed.
    Unsubscribed {
        /// Types still delivered, sorted.
        event_types: Vec<String>,
    },
    /// A pushed event.
    Event {
        /// Event type.
        event_type: String,
        /// Event payload.
        payload: Value,
        /// RFC 3339 generation time.
        timestamp: String,
    },
    /// The session ended.
    SessionClosed {
        /// The closed session.
        session_id: SessionId,
    },
    /// Connection-level failure outside any request (e.g. admission refused).
    Error {
        /// Error code.
        code: String,
        /// Error message.
        error: String,
    },
}

impl ServerMessage {
    /// Greeting for a freshly opened session.
    pub fn session(session: &Session) -> Self {
        Self::Session {
            session_id: session.id.clone(),
            client_id: session.client_id.clone(),
            client_kind: session.client_kind,
            created_at: session
                .created_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Reply carrying a command result.
    pub fn reply(result: &CommandResult) -> Self {
        Self::Reply {
            id: result.correlation_id.clone(),
            status: result.status,
            result: result.payload.clone(),
            code: result.error_code().map(str::to_owned),
            error: result.error_message().map(str::to_owned),
        }
    }

    /// Error reply for a request that produced no command result.
    pub fn reply_error(id: Option<String>, code: &str, error: impl Into<String>) -> Self {
        Self::Reply {
            id,
            status: CommandStatus::Error,
            result: None,
            code: Some(code.to_owned()),
            error: Some(error.into()),
        }
    }

    /// Push frame for an event.
    pub fn event(event: &Event) -> Self {
        Self::Event {
            event_type: event.event_type().to_owned(),
            payload: event.payload().clone(),
            timestamp: event.timestamp_rfc3339(),
        }
    }

    /// Serialize to frame text.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server message");
            String::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::errors::{INVALID_MESSAGE, UNKNOWN_COMMAND};
    use serde_json::json;

    #[test]
    fn parse_bare_command() {
        let msg = parse_client_message(r#"{"command":"ping"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Command {
                id: None,
                command: "ping".into(),
                parameters: Parameters::new(),
            }
        );
    }

    #[test]
    fn parse_typed_command_with_params() {
        let msg = parse_client_message(
            r#"{"type":"command","id":7,"command":"validate","parameters":{"content":"x","strict":true,"n":3}}"#,
        )
        .unwrap();
        let ClientMessage::Command { id, command, parameters } = msg else {
            panic!("expected command");
        };
        assert_eq!(id.as_deref(), Some("7"));
        assert_eq!(command, "validate");
        assert_eq!(parameters["content"], "x");
        assert_eq!(parameters["strict"], "true");
        assert_eq!(parameters["n"], "3");
    }

    #[test]
    fn parse_subscribe_and_close() {
        assert_eq!(
            parse_client_message(r#"{"type":"subscribe","eventTypes":["build","deploy"]}"#).unwrap(),
            ClientMessage::Subscribe {
                event_types: vec!["build".into(), "deploy".into()]
            }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"close"}"#).unwrap(),
            ClientMessage::Close
        );
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse_client_message("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            parse_client_message(r#"{"parameters":{}}"#),
            Err(ProtocolError::MissingField("command"))
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"subscribe"}"#),
            Err(ProtocolError::MissingField("eventTypes"))
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"launch"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "launch"
        ));
    }

    #[test]
    fn success_reply_shape() {
        let result = CommandResult::success(json!({"pong": true}))
            .with_correlation_id(Some("r1".into()));
        let v = serde_json::to_value(ServerMessage::reply(&result)).unwrap();
        assert_eq!(
            v,
            json!({"type": "reply", "id": "r1", "status": "success", "result": {"pong": true}})
        );
    }

    #[test]
    fn error_reply_shape() {
        let result = CommandResult::unknown_command("nope");
        let v = serde_json::to_value(ServerMessage::reply(&result)).unwrap();
        assert_eq!(v["type"], "reply");
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], UNKNOWN_COMMAND);
        assert_eq!(v["error"], "Unknown command: nope");
        assert!(v.get("id").is_none());

        let v = serde_json::to_value(ServerMessage::reply_error(None, INVALID_MESSAGE, "bad")).unwrap();
        assert_eq!(v["code"], INVALID_MESSAGE);
    }

    #[test]
    fn event_frame_shape() {
        let event = Event::new("build", json!({"ok": true}));
        let v = serde_json::to_value(ServerMessage::event(&event)).unwrap();
        assert_eq!(v["type"], "event");
        assert_eq!(v["eventType"], "build");
        assert_eq!(v["payload"], json!({"ok": true}));
        assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn session_closed_frame_shape() {
        let msg = ServerMessage::SessionClosed {
            session_id: SessionId::from("sess_1"),
        };
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"type": "session_closed", "sessionId": "sess_1"})
        );
    }
}
