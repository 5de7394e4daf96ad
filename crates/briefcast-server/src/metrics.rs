//! Prometheus metrics recorder and `/metrics` endpoint handler.

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

// Metric names recorded across the workspace.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections evicted after a failed send (counter).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Malformed inbound control frames (counter).
pub const WS_PROTOCOL_ERRORS_TOTAL: &str = "ws_protocol_errors_total";
/// Sessions with at least one connection (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Running bus bridges (gauge).
pub const BRIDGES_ACTIVE: &str = "bridges_active";
/// Bus messages a bridge could not decode (counter).
pub const BRIDGE_DECODE_FAILURES_TOTAL: &str = "bridge_decode_failures_total";
/// Event frames queued to connections (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "events_delivered_total";
/// Events accepted by the bus (counter).
pub const BUS_PUBLISH_TOTAL: &str = "bus_publish_total";
/// Failed publishes (counter, labels: reason).
pub const BUS_PUBLISH_FAILURES_TOTAL: &str = "bus_publish_failures_total";
/// Messages skipped by a lagging in-memory subscriber (counter).
pub const BUS_SUBSCRIBER_LAGGED_TOTAL: &str = "bus_subscriber_lagged_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // No global install, so tests do not conflict.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_EVICTIONS_TOTAL,
            WS_PROTOCOL_ERRORS_TOTAL,
            SESSIONS_ACTIVE,
            BRIDGES_ACTIVE,
            BRIDGE_DECODE_FAILURES_TOTAL,
            EVENTS_DELIVERED_TOTAL,
            BUS_PUBLISH_TOTAL,
            BUS_PUBLISH_FAILURES_TOTAL,
            BUS_SUBSCRIBER_LAGGED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
