//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket connections.
    pub connections: usize,
    /// Sessions with at least one connection.
    pub active_sessions: usize,
    /// Running bus bridge tasks.
    pub active_bridges: usize,
    /// Bus backend name.
    pub bus: &'static str,
}

/// Live counters feeding a health response.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCounters {
    /// Registered connections.
    pub connections: usize,
    /// Live sessions.
    pub sessions: usize,
    /// Running bridges.
    pub bridges: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, counters: HealthCounters, bus: &'static str) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: counters.connections,
        active_sessions: counters.sessions,
        active_bridges: counters.bridges,
        bus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), HealthCounters::default(), "memory");
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.bus, "memory");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, HealthCounters::default(), "memory");
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counters_tracked() {
        let counters = HealthCounters {
            connections: 5,
            sessions: 3,
            bridges: 3,
        };
        let resp = health_check(Instant::now(), counters, "redis");
        assert_eq!(resp.connections, 5);
        assert_eq!(resp.active_sessions, 3);
        assert_eq!(resp.active_bridges, 3);
    }

    #[test]
    fn serialization() {
        let counters = HealthCounters {
            connections: 2,
            sessions: 1,
            bridges: 1,
        };
        let json = serde_json::to_string(&health_check(Instant::now(), counters, "memory")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["active_sessions"], 1);
        assert_eq!(parsed["active_bridges"], 1);
        assert_eq!(parsed["bus"], "memory");
        assert!(parsed["uptime_secs"].is_number());
    }
}
