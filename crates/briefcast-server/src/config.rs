//! Server runtime configuration.

use std::time::Duration;

use briefcast_settings::BriefcastSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionOptions;

/// Configuration for the briefcast server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between `ping` frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close connections silent for this long, in milliseconds. `None`
    /// disables the check.
    pub pong_timeout_ms: Option<u64>,
    /// Per-connection outbound queue depth.
    pub outbound_queue_capacity: usize,
    /// Bus channel prefix; channels are `{prefix}:{session_id}`.
    pub channel_prefix: String,
    /// Upper bound on graceful shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: None,
            outbound_queue_capacity: 256,
            channel_prefix: "briefcast:session".into(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Derive the runtime config from loaded settings.
    pub fn from_settings(settings: &BriefcastSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            heartbeat_interval_ms: server.heartbeat_interval_ms,
            pong_timeout_ms: server.pong_timeout_ms.filter(|ms| *ms > 0),
            outbound_queue_capacity: server.outbound_queue_capacity,
            channel_prefix: settings.bus.channel_prefix.clone(),
            shutdown_timeout_ms: server.shutdown_timeout_ms,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection knobs handed to each WebSocket session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            pong_timeout: self.pong_timeout_ms.map(Duration::from_millis),
            outbound_queue_capacity: self.outbound_queue_capacity.max(1),
        }
    }

    /// Graceful shutdown bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
