//! Socket frame dispatch: parse one inbound frame, apply it to the bridge
//! and build the reply.

use bridge_core::errors::INVALID_MESSAGE;
use bridge_core::{SessionId, Subscription, TransportAdapter};
use tracing::{debug, instrument, warn};

use super::protocol::{ClientMessage, ServerMessage, parse_client_message};

/// What to send back for one inbound frame.
#[derive(Debug)]
pub struct Outcome {
    /// Frame to send.
    pub reply: ServerMessage,
    /// Whether the connection should close after sending it.
    pub close: bool,
}

impl Outcome {
    fn reply(reply: ServerMessage) -> Self {
        Self { reply, close: false }
    }
}

/// Handle an inbound text frame for `session_id`.
///
/// `subscription` is the connection's live subscription; subscribe and
/// unsubscribe frames adjust it in place. Malformed frames produce an
/// `INVALID_MESSAGE` reply and leave the connection open.
#[instrument(skip_all, fields(session_id = %session_id, kind))]
pub async fn handle_text<A>(
    text: &str,
    adapter: &A,
    session_id: &SessionId,
    subscription: &Subscription,
) -> Outcome
where
    A: TransportAdapter + ?Sized,
{
    let message = match parse_client_message(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "invalid frame");
            return Outcome::reply(ServerMessage::reply_error(None, INVALID_MESSAGE, e.to_string()));
        }
    };

    match message {
        ClientMessage::Command {
            id,
            command,
            parameters,
        } => {
            let _ = tracing::Span::current().record("kind", "command");
            debug!(command, "dispatching command");
            match adapter
                .on_command(session_id, &command, parameters, id.clone())
                .await
            {
                Ok(result) => Outcome::reply(ServerMessage::reply(&result)),
                Err(e) => Outcome::reply(ServerMessage::reply_error(id, e.code(), e.to_string())),
            }
        }
        ClientMessage::Subscribe { event_types } => {
            let _ = tracing::Span::current().record("kind", "subscribe");
            match adapter.bridge().extend_subscription(subscription, &event_types) {
                Ok(_) => Outcome::reply(ServerMessage::Subscribed {
                    event_types: subscription.event_types(),
                }),
                Err(e) => Outcome::reply(ServerMessage::reply_error(None, e.code(), e.to_string())),
            }
        }
        ClientMessage::Unsubscribe { event_types } => {
            let _ = tracing::Span::current().record("kind", "unsubscribe");
            match adapter.bridge().retract_subscription(subscription, &event_types) {
                Ok(_) => Outcome::reply(ServerMessage::Unsubscribed {
                    event_types: subscription.event_types(),
                }),
                Err(e) => Outcome::reply(ServerMessage::reply_error(None, e.code(), e.to_string())),
            }
        }
        ClientMessage::Close => {
            let _ = tracing::Span::current().record("kind", "close");
            let _ = adapter.on_disconnect(session_id).await;
            Outcome {
                reply: ServerMessage::SessionClosed {
                    session_id: session_id.clone(),
                },
                close: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bridge_core::{
        Bridge, BridgeConfig, ClientKind, CommandRegistry, CommandStatus, Event,
        SubscriptionGuard,
    };
    use serde_json::json;

    use crate::websocket::SocketAdapter;

    struct Fixture {
        adapter: SocketAdapter,
        session_id: SessionId,
        guard: SubscriptionGuard,
    }

    async fn fixture() -> Fixture {
        let bridge = Arc::new(Bridge::new(
            &BridgeConfig::default(),
            CommandRegistry::with_builtins(),
        ));
        let adapter = SocketAdapter::new(bridge);
        let session_id = adapter.on_connect("ide-1", ClientKind::Ide).await.unwrap();
        let guard = adapter
            .bridge()
            .subscribe(&session_id, Vec::<String>::new())
            .unwrap();
        Fixture {
            adapter,
            session_id,
            guard,
        }
    }

    async fn handle(f: &Fixture, text: &str) -> Outcome {
        handle_text(text, &f.adapter, &f.session_id, f.guard.subscription()).await
    }

    #[tokio::test]
    async fn ping_command_replies_with_id() {
        let f = fixture().await;
        let out = handle(&f, r#"{"type":"command","id":"7","command":"ping"}"#).await;
        assert!(!out.close);
        let ServerMessage::Reply {
            id, status, result, ..
        } = out.reply
        else {
            panic!("expected reply, got {:?}", out.reply);
        };
        assert_eq!(id.as_deref(), Some("7"));
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(result.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn unknown_command_is_error_reply() {
        let f = fixture().await;
        let out = handle(&f, r#"{"command":"launch_rockets"}"#).await;
        let ServerMessage::Reply { status, code, .. } = out.reply else {
            panic!("expected reply");
        };
        assert_eq!(status, CommandStatus::Error);
        assert_eq!(code.as_deref(), Some("UNKNOWN_COMMAND"));
    }

    #[tokio::test]
    async fn malformed_frame_is_invalid_message() {
        let f = fixture().await;
        let out = handle(&f, "{not json").await;
        assert!(!out.close);
        let ServerMessage::Reply { code, .. } = out.reply else {
            panic!("expected reply");
        };
        assert_eq!(code.as_deref(), Some(INVALID_MESSAGE));
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_adjust_delivery() {
        let f = fixture().await;
        let out = handle(&f, r#"{"type":"subscribe","eventTypes":["build","log"]}"#).await;
        assert_eq!(
            out.reply,
            ServerMessage::Subscribed {
                event_types: vec!["build".into(), "log".into()]
            }
        );
        let session = f.adapter.bridge().session(&f.session_id).unwrap();
        assert!(session.subscriptions.contains("build"));

        let _ = f.adapter.bridge().publish(Event::new("log", json!({"line": 1})));
        let event = f.guard.subscription().queue().try_recv().unwrap();
        assert_eq!(event.event_type(), "log");

        let out = handle(&f, r#"{"type":"unsubscribe","eventTypes":["log"]}"#).await;
        assert_eq!(
            out.reply,
            ServerMessage::Unsubscribed {
                event_types: vec!["build".into()]
            }
        );
        let _ = f.adapter.bridge().publish(Event::new("log", json!({"line": 2})));
        assert!(f.guard.subscription().queue().try_recv().is_none());
    }

    #[tokio::test]
    async fn close_frame_closes_session() {
        let f = fixture().await;
        let out = handle(&f, r#"{"type":"close"}"#).await;
        assert!(out.close);
        assert_eq!(
            out.reply,
            ServerMessage::SessionClosed {
                session_id: f.session_id.clone()
            }
        );
        assert!(f.adapter.bridge().session(&f.session_id).is_err());
    }

    #[tokio::test]
    async fn command_after_close_reports_missing_session() {
        let f = fixture().await;
        let _ = handle(&f, r#"{"type":"close"}"#).await;
        let out = handle(&f, r#"{"id":1,"command":"ping"}"#).await;
        let ServerMessage::Reply { id, code, .. } = out.reply else {
            panic!("expected reply");
        };
        assert_eq!(id.as_deref(), Some("1"));
        assert_eq!(code.as_deref(), Some("SESSION_NOT_FOUND"));
    }
}
