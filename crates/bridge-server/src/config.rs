//! Server configuration.

use std::time::Duration;

use bridge_core::{BridgeConfig, ExecutionPolicy};
use bridge_settings::BridgeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the bridge server's listeners and connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// WebSocket/HTTP port (default `0` for auto-assign).
    pub port: u16,
    /// gRPC port (default `0` for auto-assign).
    pub rpc_port: u16,
    /// Max inbound message size in bytes, for both transports.
    pub max_message_size: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a socket that has been silent this long.
    pub heartbeat_timeout_secs: u64,
    /// Outbound frames buffered per socket connection.
    pub outbound_buffer: usize,
    /// Close sessions idle this long; `0` disables reaping.
    pub idle_timeout_secs: u64,
    /// How often the idle reaper runs.
    pub reap_interval_secs: u64,
    /// How long shutdown waits for connection tasks to drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            rpc_port: 0,
            max_message_size: 4 * 1024 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            outbound_buffer: 1024,
            idle_timeout_secs: 0,
            reap_interval_secs: 60,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Take listener and connection settings from loaded settings.
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            rpc_port: server.rpc_port,
            max_message_size: server.max_message_size,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            outbound_buffer: server.outbound_buffer,
            idle_timeout_secs: settings.sessions.idle_timeout_secs,
            reap_interval_secs: settings.sessions.reap_interval_secs,
            ..Self::default()
        }
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Silence allowed before a socket is dropped.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Idle threshold for the reaper, if reaping is on.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Reaper period.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    /// Drain deadline at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Core configuration derived from loaded settings.
pub fn bridge_config(settings: &BridgeSettings) -> BridgeConfig {
    BridgeConfig {
        max_sessions: settings.sessions.max_sessions,
        event_queue_capacity: settings.sessions.event_queue_capacity,
        execution: ExecutionPolicy {
            handler_timeout: settings.commands.handler_timeout(),
            cancel_grace: settings.commands.cancel_grace(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_ephemeral_ports() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.rpc_port, 0);
    }

    #[test]
    fn default_disables_reaping() {
        let cfg = ServerConfig::default();
        assert!(cfg.idle_timeout().is_none());
    }

    #[test]
    fn from_settings_copies_listener_fields() {
        let mut settings = BridgeSettings::default();
        settings.server.port = 7000;
        settings.server.rpc_port = 7001;
        settings.sessions.idle_timeout_secs = 120;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.rpc_port, 7001);
        assert_eq!(cfg.idle_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(cfg.max_message_size, settings.server.max_message_size);
    }

    #[test]
    fn bridge_config_carries_limits_and_timeouts() {
        let mut settings = BridgeSettings::default();
        settings.sessions.max_sessions = 3;
        settings.commands.handler_timeout_secs = 5;
        settings.commands.cancel_grace_ms = 250;
        let cfg = bridge_config(&settings);
        assert_eq!(cfg.max_sessions, 3);
        assert_eq!(cfg.execution.handler_timeout, Duration::from_secs(5));
        assert_eq!(cfg.execution.cancel_grace, Duration::from_millis(250));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            reap_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cfg.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.outbound_buffer, cfg.outbound_buffer);
    }
}
