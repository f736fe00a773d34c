//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names, shared with bridge-core's literals.

/// Sessions opened (counter, labels: transport).
pub const SESSIONS_OPENED_TOTAL: &str = "bridge_sessions_opened_total";
/// Sessions refused at admission (counter).
pub const SESSIONS_REJECTED_TOTAL: &str = "bridge_sessions_rejected_total";
/// Open sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "bridge_sessions_active";
/// Commands executed (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "bridge_commands_total";
/// Failed commands (counter, labels: command, code).
pub const COMMAND_ERRORS_TOTAL: &str = "bridge_command_errors_total";
/// Command latency (histogram, labels: command).
pub const COMMAND_DURATION_SECONDS: &str = "bridge_command_duration_seconds";
/// Events published (counter).
pub const EVENTS_PUBLISHED_TOTAL: &str = "bridge_events_published_total";
/// Events evicted from full subscription queues (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "bridge_events_dropped_total";
/// Sessions closed by the idle reaper (counter).
pub const SESSIONS_REAPED_TOTAL: &str = "bridge_sessions_reaped_total";
/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "bridge_ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "bridge_ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "bridge_ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "bridge_ws_connection_duration_seconds";
/// Live gRPC event streams (gauge).
pub const RPC_STREAMS_ACTIVE: &str = "bridge_rpc_streams_active";
