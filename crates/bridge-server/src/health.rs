//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while admitting sessions, `"draining"` during shutdown.
    pub status: String,
    /// Whether a new session would be admitted now.
    pub accepting_sessions: bool,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open sessions across both transports.
    pub active_sessions: usize,
    /// Live event subscriptions.
    pub subscriptions: usize,
    /// Open socket connections.
    pub connections: usize,
}

/// Live counters feeding a health response.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCounters {
    /// Admission is open and no shutdown is underway.
    pub admitting: bool,
    /// Admission would succeed right now (open and under the limit).
    pub accepting_sessions: bool,
    /// Open sessions.
    pub active_sessions: usize,
    /// Live subscriptions.
    pub subscriptions: usize,
    /// Open socket connections.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, counters: HealthCounters) -> HealthResponse {
    HealthResponse {
        status: if counters.admitting { "ok" } else { "draining" }.into(),
        accepting_sessions: counters.accepting_sessions,
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions: counters.active_sessions,
        subscriptions: counters.subscriptions,
        connections: counters.connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> HealthCounters {
        HealthCounters {
            admitting: true,
            accepting_sessions: true,
            ..HealthCounters::default()
        }
    }

    #[test]
    fn status_is_ok_while_admitting() {
        let resp = health_check(Instant::now(), open());
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn status_is_draining_when_admission_closed() {
        let resp = health_check(Instant::now(), HealthCounters::default());
        assert_eq!(resp.status, "draining");
        assert!(!resp.accepting_sessions);
    }

    #[test]
    fn full_bridge_is_ok_but_not_accepting() {
        let counters = HealthCounters {
            accepting_sessions: false,
            active_sessions: 4,
            ..open()
        };
        let resp = health_check(Instant::now(), counters);
        assert_eq!(resp.status, "ok");
        assert!(!resp.accepting_sessions);
        assert_eq!(resp.active_sessions, 4);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, open());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization_uses_camel_case() {
        let counters = HealthCounters {
            connections: 2,
            subscriptions: 3,
            active_sessions: 1,
            ..open()
        };
        let json = serde_json::to_value(health_check(Instant::now(), counters)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 2);
        assert_eq!(json["subscriptions"], 3);
        assert_eq!(json["activeSessions"], 1);
        assert_eq!(json["acceptingSessions"], true);
        assert!(json["uptimeSecs"].is_number());
    }
}
