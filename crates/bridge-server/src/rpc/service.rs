//! gRPC adapter: maps `bridge.v1.BridgeService` onto the bridge.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{
    Bridge, BridgeError, ClientKind, CommandResult, CommandStatus, Event, SessionId,
    TransportAdapter, TransportKind,
};
use futures::{Stream, StreamExt, stream};
use metrics::gauge;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::v1 as pb;
use super::proto::BridgeService;
use crate::metrics::RPC_STREAMS_ACTIVE;

/// Stream type returned by `StreamEvents`.
pub type EventMessageStream = Pin<Box<dyn Stream<Item = Result<pb::EventMessage, Status>> + Send>>;

/// RPC front-end of the bridge.
pub struct RpcAdapter {
    bridge: Arc<Bridge>,
}

impl RpcAdapter {
    /// Create an adapter over `bridge`.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl TransportAdapter for RpcAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Rpc
    }

    fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

/// Unset means CLI, as on the socket transport when `clientKind` is absent.
fn client_kind(raw: i32) -> Result<ClientKind, Status> {
    match pb::ClientKind::try_from(raw) {
        Ok(pb::ClientKind::Ide) => Ok(ClientKind::Ide),
        Ok(pb::ClientKind::Cli | pb::ClientKind::Unspecified) => Ok(ClientKind::Cli),
        Err(_) => Err(Status::invalid_argument(format!("invalid client_kind: {raw}"))),
    }
}

fn status_for(error: &BridgeError) -> pb::Status {
    match error {
        BridgeError::SessionNotFound(_) => pb::Status::SessionExpired,
        BridgeError::SessionLimitExceeded { .. } | BridgeError::NotAccepting => {
            pb::Status::SessionLimitExceeded
        }
        BridgeError::SessionNotActive(_) => pb::Status::Error,
    }
}

fn command_response(result: &CommandResult) -> pb::CommandResponse {
    let status = match result.status {
        CommandStatus::Success => pb::Status::Ok,
        CommandStatus::Error => pb::Status::Error,
    };
    pb::CommandResponse {
        status: status.into(),
        result: result
            .payload
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        error: result.error_message().unwrap_or_default().to_owned(),
        error_code: result.error_code().unwrap_or_default().to_owned(),
        correlation_id: result.correlation_id.clone().unwrap_or_default(),
    }
}

fn event_message(event: &Event) -> pb::EventMessage {
    pb::EventMessage {
        event_type: event.event_type().to_owned(),
        payload: event.payload().to_string(),
        timestamp: event.timestamp_rfc3339(),
    }
}

/// Decrements the live-stream gauge when the stream is dropped.
struct StreamGauge;

impl StreamGauge {
    fn new() -> Self {
        gauge!(RPC_STREAMS_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        gauge!(RPC_STREAMS_ACTIVE).decrement(1.0);
    }
}

#[async_trait]
impl BridgeService for RpcAdapter {
    type StreamEventsStream = EventMessageStream;

    #[instrument(skip_all, fields(client_id))]
    async fn connect(
        &self,
        request: Request<pb::ConnectRequest>,
    ) -> Result<Response<pb::ConnectResponse>, Status> {
        let req = request.into_inner();
        if req.client_id.trim().is_empty() {
            return Err(Status::invalid_argument("client_id is required"));
        }
        let kind = client_kind(req.client_kind)?;
        let _ = tracing::Span::current().record("client_id", req.client_id.as_str());
        let response = match self.on_connect(&req.client_id, kind).await {
            Ok(session_id) => {
                info!(session_id = %session_id, "rpc session opened");
                pb::ConnectResponse {
                    session_id: session_id.into_inner(),
                    status: pb::Status::Ok.into(),
                    error: String::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "rpc session refused");
                pb::ConnectResponse {
                    session_id: String::new(),
                    status: status_for(&e).into(),
                    error: e.to_string(),
                }
            }
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, fields(session_id, command))]
    async fn send_command(
        &self,
        request: Request<pb::CommandRequest>,
    ) -> Result<Response<pb::CommandResponse>, Status> {
        let req = request.into_inner();
        let span = tracing::Span::current();
        let _ = span.record("session_id", req.session_id.as_str());
        let _ = span.record("command", req.command.as_str());
        if req.command.is_empty() {
            return Err(Status::invalid_argument("command is required"));
        }

        let session_id = SessionId::from(req.session_id);
        let correlation_id = (!req.correlation_id.is_empty()).then_some(req.correlation_id);
        let parameters = req.parameters.into_iter().collect();
        let response = match self
            .on_command(&session_id, &req.command, parameters, correlation_id.clone())
            .await
        {
            Ok(result) => command_response(&result),
            Err(e) => {
                debug!(error = %e, "command refused");
                pb::CommandResponse {
                    status: status_for(&e).into(),
                    result: String::new(),
                    error: e.to_string(),
                    error_code: e.code().to_owned(),
                    correlation_id: correlation_id.unwrap_or_default(),
                }
            }
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, fields(session_id))]
    async fn stream_events(
        &self,
        request: Request<pb::StreamEventsRequest>,
    ) -> Result<Response<Self::StreamEventsStream>, Status> {
        let req = request.into_inner();
        let _ = tracing::Span::current().record("session_id", req.session_id.as_str());
        let session_id = SessionId::from(req.session_id);
        let events = self
            .on_subscribe(&session_id, req.event_types)
            .map_err(|e| match e {
                BridgeError::SessionNotFound(_) => Status::not_found(e.to_string()),
                _ => Status::failed_precondition(e.to_string()),
            })?;
        debug!("event stream opened");

        let state = (events, StreamGauge::new());
        let stream = stream::unfold(state, |(mut events, gauge)| async move {
            let event = events.next().await?;
            Some((Ok(event_message(&event)), (events, gauge)))
        });
        Ok(Response::new(Box::pin(stream)))
    }

    #[instrument(skip_all, fields(session_id))]
    async fn disconnect(
        &self,
        request: Request<pb::DisconnectRequest>,
    ) -> Result<Response<pb::DisconnectResponse>, Status> {
        let req = request.into_inner();
        let _ = tracing::Span::current().record("session_id", req.session_id.as_str());
        let closed = self.on_disconnect(&SessionId::from(req.session_id)).await;
        Ok(Response::new(pb::DisconnectResponse { closed }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{BridgeConfig, CommandRegistry};
    use serde_json::json;
    use std::time::Duration;

    fn adapter_with_limit(max_sessions: usize) -> RpcAdapter {
        let config = BridgeConfig {
            max_sessions,
            ..BridgeConfig::default()
        };
        RpcAdapter::new(Arc::new(Bridge::new(
            &config,
            CommandRegistry::with_builtins(),
        )))
    }

    async fn connect(adapter: &RpcAdapter, client_id: &str) -> pb::ConnectResponse {
        adapter
            .connect(Request::new(pb::ConnectRequest {
                client_id: client_id.into(),
                client_kind: pb::ClientKind::Ide.into(),
            }))
            .await
            .unwrap()
            .into_inner()
    }

    #[tokio::test]
    async fn connect_opens_rpc_session() {
        let adapter = adapter_with_limit(4);
        let resp = connect(&adapter, "ide-1").await;
        assert_eq!(resp.status(), pb::Status::Ok);
        let session = adapter
            .bridge()
            .session(&SessionId::from(resp.session_id))
            .unwrap();
        assert_eq!(session.transport, TransportKind::Rpc);
        assert_eq!(session.client_kind, ClientKind::Ide);
    }

    #[tokio::test]
    async fn connect_rejects_blank_client_id() {
        let adapter = adapter_with_limit(4);
        let err = adapter
            .connect(Request::new(pb::ConnectRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn connect_rejects_unknown_client_kind() {
        let adapter = adapter_with_limit(4);
        let err = adapter
            .connect(Request::new(pb::ConnectRequest {
                client_id: "x".into(),
                client_kind: 99,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
        assert!(err.message().contains("99"));
        assert_eq!(adapter.bridge().sessions().active_count(), 0);
    }

    #[tokio::test]
    async fn connect_unspecified_kind_defaults_to_cli() {
        let adapter = adapter_with_limit(4);
        let resp = adapter
            .connect(Request::new(pb::ConnectRequest {
                client_id: "x".into(),
                client_kind: pb::ClientKind::Unspecified.into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), pb::Status::Ok);
        let session = adapter
            .bridge()
            .session(&SessionId::from(resp.session_id))
            .unwrap();
        assert_eq!(session.client_kind, ClientKind::Cli);
    }

    #[tokio::test]
    async fn connect_over_limit_reports_status() {
        let adapter = adapter_with_limit(1);
        let _ = connect(&adapter, "a").await;
        let resp = connect(&adapter, "b").await;
        assert_eq!(resp.status(), pb::Status::SessionLimitExceeded);
        assert!(resp.session_id.is_empty());
        assert!(!resp.error.is_empty());
    }

    #[tokio::test]
    async fn send_command_echoes_correlation_id() {
        let adapter = adapter_with_limit(4);
        let session_id = connect(&adapter, "a").await.session_id;
        let resp = adapter
            .send_command(Request::new(pb::CommandRequest {
                session_id,
                command: "ping".into(),
                parameters: Default::default(),
                correlation_id: "req-9".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), pb::Status::Ok);
        assert_eq!(resp.correlation_id, "req-9");
        let payload: serde_json::Value = serde_json::from_str(&resp.result).unwrap();
        assert_eq!(payload["pong"], true);
    }

    #[tokio::test]
    async fn send_command_to_unknown_session_is_expired() {
        let adapter = adapter_with_limit(4);
        let resp = adapter
            .send_command(Request::new(pb::CommandRequest {
                session_id: "sess_gone".into(),
                command: "ping".into(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), pb::Status::SessionExpired);
        assert_eq!(resp.error_code, "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_command_is_error_status() {
        let adapter = adapter_with_limit(4);
        let session_id = connect(&adapter, "a").await.session_id;
        let resp = adapter
            .send_command(Request::new(pb::CommandRequest {
                session_id,
                command: "nope".into(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.status(), pb::Status::Error);
        assert_eq!(resp.error_code, "UNKNOWN_COMMAND");
        assert!(resp.result.is_empty());
    }

    #[tokio::test]
    async fn stream_delivers_matching_events_and_ends_on_disconnect() {
        let adapter = adapter_with_limit(4);
        let session_id = connect(&adapter, "a").await.session_id;
        let mut stream = adapter
            .stream_events(Request::new(pb::StreamEventsRequest {
                session_id: session_id.clone(),
                event_types: vec!["build".into()],
            }))
            .await
            .unwrap()
            .into_inner();

        let _ = adapter.bridge().publish(Event::new("log", json!({})));
        let _ = adapter.bridge().publish(Event::new("build", json!({"ok": true})));
        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.event_type, "build");
        assert_eq!(first.payload, r#"{"ok":true}"#);

        let resp = adapter
            .disconnect(Request::new(pb::DisconnectRequest { session_id }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.closed);
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn dropping_stream_unregisters_subscription() {
        let adapter = adapter_with_limit(4);
        let session_id = connect(&adapter, "a").await.session_id;
        let stream = adapter
            .stream_events(Request::new(pb::StreamEventsRequest {
                session_id,
                event_types: vec!["build".into()],
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(adapter.bridge().broadcaster().subscription_count(), 1);
        drop(stream);
        assert_eq!(adapter.bridge().broadcaster().subscription_count(), 0);
    }

    #[tokio::test]
    async fn stream_for_unknown_session_is_not_found() {
        let adapter = adapter_with_limit(4);
        let err = adapter
            .stream_events(Request::new(pb::StreamEventsRequest {
                session_id: "sess_missing".into(),
                event_types: vec![],
            }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let adapter = adapter_with_limit(4);
        let session_id = connect(&adapter, "a").await.session_id;
        let first = adapter
            .disconnect(Request::new(pb::DisconnectRequest {
                session_id: session_id.clone(),
            }))
            .await
            .unwrap()
            .into_inner();
        let second = adapter
            .disconnect(Request::new(pb::DisconnectRequest { session_id }))
            .await
            .unwrap()
            .into_inner();
        assert!(first.closed);
        assert!(!second.closed);
    }
}
