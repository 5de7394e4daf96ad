//! Periodic `ping` control frames and pong-based liveness.

use std::sync::Arc;
use std::time::Duration;

use briefcast_core::TransportError;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::ClientConnection;
use super::protocol::ServerFrame;

/// Default interval between pings.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// A ping could not be queued; the connection is dead.
    SendFailed(TransportError),
    /// No pong arrived within the configured timeout.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Send a `{"type":"ping"}` frame every `interval` until something fails.
///
/// The first ping goes out one full interval after start. With
/// `pong_timeout` set, a connection whose last pong is older than the
/// timeout at a tick is reported as [`HeartbeatResult::TimedOut`].
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    pong_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if !connection.check_alive() {
                    debug!(conn_id = %connection.id, "no pong since previous ping");
                }
                if let Some(timeout) = pong_timeout {
                    if connection.last_pong_elapsed() > timeout {
                        return HeartbeatResult::TimedOut;
                    }
                }
                if let Err(e) = connection.send_frame(&ServerFrame::Ping) {
                    return HeartbeatResult::SendFailed(e);
                }
            }
        }
    }
}
