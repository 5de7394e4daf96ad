//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use briefcast_core::{ProtocolError, SessionId};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{self, HeartbeatResult, run_heartbeat};
use super::protocol::ClientFrame;
use super::registry::SessionRegistry;

/// How long the writer gets to send the close frame after the session ends.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-connection runtime knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between `ping` control frames.
    pub heartbeat_interval: Duration,
    /// Close a connection whose last pong is older than this. `None` disables.
    pub pong_timeout: Option<Duration>,
    /// Outbound frames buffered per connection before it counts as slow.
    pub outbound_queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: heartbeat::DEFAULT_INTERVAL,
            pong_timeout: None,
            outbound_queue_capacity: 256,
        }
    }
}

/// Run a WebSocket session for one client of `session_id`.
///
/// 1. Registers with the registry, which queues the `connected` frame
/// 2. Forwards queued frames to the socket
/// 3. Sends periodic `ping` frames
/// 4. Applies `pong` / `subscribe` / `unsubscribe` control frames
/// 5. Disconnects exactly once, whichever side ends the session
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    session_id: SessionId,
    registry: SessionRegistry,
    options: SessionOptions,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (connection, mut outbound_rx) = ClientConnection::channel(options.outbound_queue_capacity);
    let conn_id = connection.id.clone();

    if let Err(error) = registry
        .connect(Arc::clone(&connection), session_id.clone())
        .await
    {
        warn!(%conn_id, %error, "failed to register connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    info!(%conn_id, "client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    let closed = connection.close_token();

    let writer_conn = Arc::clone(&connection);
    let mut writer = tokio::spawn(
        async move {
            let closed = writer_conn.close_token();
            loop {
                tokio::select! {
                    biased;
                    () = closed.cancelled() => break,
                    frame = outbound_rx.recv() => {
                        let Some(text) = frame else { break };
                        if let Err(error) = ws_tx.send(Message::Text(String::clone(&text).into())).await {
                            debug!(%error, "socket write failed");
                            writer_conn.close();
                            return;
                        }
                    }
                }
            }
            writer_conn.close();
            let _ = ws_tx.send(Message::Close(None)).await;
        }
        .instrument(Span::current()),
    );

    let heartbeat_conn = Arc::clone(&connection);
    let heartbeat = tokio::spawn(
        async move {
            let cancel = heartbeat_conn.close_token();
            let result = run_heartbeat(
                Arc::clone(&heartbeat_conn),
                options.heartbeat_interval,
                options.pong_timeout,
                cancel,
            )
            .await;
            match result {
                HeartbeatResult::TimedOut => warn!("no pong within timeout, closing connection"),
                HeartbeatResult::SendFailed(error) => debug!(%error, "heartbeat could not queue ping"),
                HeartbeatResult::Cancelled => {}
            }
            heartbeat_conn.close();
        }
        .instrument(Span::current()),
    );

    let reason = tokio::select! {
        reason = read_frames(&mut ws_rx, &registry, &session_id, &connection) => reason,
        () = closed.cancelled() => "closed by server",
    };

    let removed = registry.disconnect(&conn_id, &session_id).await;
    connection.close();
    if timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    heartbeat.abort();

    let age = connection.age();
    info!(
        %conn_id,
        reason,
        removed,
        dropped = connection.drop_count(),
        age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(age.as_secs_f64());
}

/// Read inbound frames until the client goes away. Returns why.
async fn read_frames(
    ws_rx: &mut SplitStream<WebSocket>,
    registry: &SessionRegistry,
    session_id: &SessionId,
    connection: &Arc<ClientConnection>,
) -> &'static str {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatch(registry, session_id, connection, ClientFrame::parse(text.as_str())).await;
            }
            Ok(Message::Binary(data)) => {
                dispatch(registry, session_id, connection, ClientFrame::parse_bytes(&data)).await;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => connection.mark_alive(),
            Ok(Message::Close(_)) => return "client closed",
            Err(error) => {
                debug!(%error, "socket read failed");
                return "read error";
            }
        }
    }
    "stream ended"
}

/// Apply one inbound control frame. Bad frames are logged and ignored; they
/// never end the session.
pub(crate) async fn dispatch(
    registry: &SessionRegistry,
    session_id: &SessionId,
    connection: &Arc<ClientConnection>,
    frame: Result<ClientFrame, ProtocolError>,
) {
    let frame = match frame {
        Ok(frame) => frame,
        Err(error) => {
            warn!(conn_id = %connection.id, %error, "ignoring malformed control frame");
            counter!("ws_protocol_errors_total").increment(1);
            return;
        }
    };

    match frame {
        ClientFrame::Pong => connection.mark_alive(),
        ClientFrame::Subscribe { .. } => {
            if let Some(filter) = frame.into_filter() {
                debug!(
                    conn_id = %connection.id,
                    agents = filter.agents.len(),
                    event_types = filter.event_types.len(),
                    "connection filter set"
                );
                let _ = registry
                    .set_connection_filter(session_id, &connection.id, filter)
                    .await;
            }
        }
        ClientFrame::Unsubscribe => {
            let _ = registry
                .clear_connection_filter(session_id, &connection.id)
                .await;
        }
        ClientFrame::Unknown => {
            debug!(conn_id = %connection.id, kind = frame.kind(), "ignoring unknown control frame");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
