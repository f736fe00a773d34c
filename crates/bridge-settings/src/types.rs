//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial file
//! only has to name the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Session admission and lifetime.
    pub sessions: SessionSettings,
    /// Command execution timing.
    pub commands: CommandSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl BridgeSettings {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sessions.max_sessions == 0 {
            return Err(SettingsError::InvalidValue(
                "sessions.maxSessions must be at least 1".into(),
            ));
        }
        if self.sessions.event_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sessions.eventQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than heartbeatIntervalSecs"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Network listeners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address for both listeners.
    pub host: String,
    /// WebSocket + HTTP port.
    pub port: u16,
    /// gRPC port.
    pub rpc_port: u16,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Seconds between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Outbound frames buffered per WebSocket connection.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9850,
            rpc_port: 9851,
            max_message_size: 4 * 1024 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            outbound_buffer: 1024,
        }
    }
}

impl ServerSettings {
    /// Ping interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong deadline as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Session admission and lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Concurrent session limit.
    pub max_sessions: usize,
    /// Bound of each subscription's event queue.
    pub event_queue_capacity: usize,
    /// Idle sessions are closed after this many seconds; 0 disables reaping.
    pub idle_timeout_secs: u64,
    /// Seconds between idle sweeps.
    pub reap_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            event_queue_capacity: 256,
            idle_timeout_secs: 1800,
            reap_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    /// Idle cutoff, or `None` when reaping is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Sweep period (at least one second).
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// Command execution timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandSettings {
    /// Seconds a handler may run before it is cancelled.
    pub handler_timeout_secs: u64,
    /// Milliseconds a cancelled handler gets to finish.
    pub cancel_grace_ms: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 60,
            cancel_grace_ms: 2000,
        }
    }
}

impl CommandSettings {
    /// Handler budget as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    /// Cancellation grace as a [`Duration`].
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Logging output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = BridgeSettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9850);
        assert_eq!(s.server.rpc_port, 9851);
        assert_eq!(s.sessions.max_sessions, 256);
        assert_eq!(s.sessions.event_queue_capacity, 256);
        assert_eq!(s.commands.handler_timeout(), Duration::from_secs(60));
        assert_eq!(s.commands.cancel_grace(), Duration::from_millis(2000));
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_wire_names() {
        let v = serde_json::to_value(BridgeSettings::default()).unwrap();
        assert_eq!(v["server"]["rpcPort"], 9851);
        assert_eq!(v["sessions"]["eventQueueCapacity"], 256);
        assert_eq!(v["commands"]["cancelGraceMs"], 2000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: BridgeSettings = serde_json::from_str(r#"{"sessions": {"maxSessions": 3}}"#).unwrap();
        assert_eq!(s.sessions.max_sessions, 3);
        assert_eq!(s.sessions.event_queue_capacity, 256);
        assert_eq!(s.server.port, 9850);
    }

    #[test]
    fn zero_limits_rejected() {
        let mut s = BridgeSettings::default();
        s.sessions.max_sessions = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));

        let mut s = BridgeSettings::default();
        s.sessions.event_queue_capacity = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn idle_timeout_zero_disables() {
        let mut s = SessionSettings::default();
        assert_eq!(s.idle_timeout(), Some(Duration::from_secs(1800)));
        s.idle_timeout_secs = 0;
        assert_eq!(s.idle_timeout(), None);
    }
}
