//! Settings type definitions.
//!
//! JSON field names are camelCase. Every struct is `#[serde(default)]`, so a
//! settings file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "heartbeatIntervalMs": 15000 },
///   "bus": { "backend": "redis", "url": "redis://127.0.0.1:6379" },
///   "logging": { "level": "debug", "json": true }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BriefcastSettings {
    /// Listener and connection runtime knobs.
    pub server: ServerSettings,
    /// Broadcast bus selection.
    pub bus: BusSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and per-connection runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Interval between `ping` control frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Evict a connection that has not answered a ping within this many
    /// milliseconds. Unset disables the check; dead peers are then found by
    /// failed writes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_ms: Option<u64>,
    /// Per-connection outbound queue depth. A full queue evicts the
    /// connection.
    pub outbound_queue_capacity: usize,
    /// Upper bound on graceful shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: None,
            outbound_queue_capacity: 256,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Which broadcast bus implementation to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process bus; single server instance only.
    #[default]
    Memory,
    /// Redis pub/sub; requires the `redis` feature of the server binary.
    Redis,
}

/// Broadcast bus settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Backend implementation.
    pub backend: BusBackend,
    /// Connection URL for networked backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Channel names are `{channelPrefix}:{session_id}`.
    pub channel_prefix: String,
    /// Per-channel buffer of the in-memory backend.
    pub memory_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            url: None,
            channel_prefix: "briefcast:session".to_string(),
            memory_capacity: 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = BriefcastSettings::default();
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.server.heartbeat_interval_ms, 30_000);
        assert_eq!(s.server.pong_timeout_ms, None);
        assert_eq!(s.bus.backend, BusBackend::Memory);
        assert_eq!(s.bus.channel_prefix, "briefcast:session");
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(BriefcastSettings::default()).unwrap();
        assert_eq!(json["server"]["heartbeatIntervalMs"], 30_000);
        assert_eq!(json["bus"]["channelPrefix"], "briefcast:session");
        assert_eq!(json["bus"]["backend"], "memory");
        assert!(json["server"].get("pongTimeoutMs").is_none());
        assert!(json["bus"].get("url").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: BriefcastSettings =
            serde_json::from_str(r#"{"server":{"port":9100},"bus":{"backend":"redis"}}"#).unwrap();
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.bus.backend, BusBackend::Redis);
        assert_eq!(s.bus.memory_capacity, 1024);
    }

    #[test]
    fn unknown_backend_rejected() {
        let result = serde_json::from_str::<BusSettings>(r#"{"backend":"kafka"}"#);
        assert!(result.is_err());
    }
}
