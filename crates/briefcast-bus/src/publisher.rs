//! Producer-side client: serialize an event and put it on the session's
//! channel.
//!
//! Publishing is fire-and-forget. A failure is logged and reported as
//! `false`; it never panics and never retries.

use std::sync::Arc;

use briefcast_core::{EventRecord, SessionId};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::bus::{BroadcastBus, channel_name};

/// Publishes event records to per-session bus channels.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn BroadcastBus>,
    channel_prefix: Arc<str>,
}

impl Publisher {
    /// Create a publisher over a shared bus.
    pub fn new(bus: Arc<dyn BroadcastBus>, channel_prefix: impl Into<String>) -> Self {
        Self {
            bus,
            channel_prefix: channel_prefix.into().into(),
        }
    }

    /// Channel carrying `session_id`'s events.
    pub fn channel_for(&self, session_id: &SessionId) -> String {
        channel_name(&self.channel_prefix, session_id)
    }

    /// Serialize `event` and publish it on the session's channel.
    ///
    /// Returns `true` once the bus accepted the message, whether or not
    /// anyone is subscribed.
    #[instrument(skip_all, fields(session_id = %session_id, event_id = %event.event_id()))]
    pub async fn publish(&self, session_id: &SessionId, event: &EventRecord) -> bool {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to serialize event record");
                counter!("bus_publish_failures_total", "reason" => "serialize").increment(1);
                return false;
            }
        };
        self.publish_raw(session_id, payload).await
    }

    /// Publish an already-serialized record.
    pub async fn publish_raw(&self, session_id: &SessionId, payload: String) -> bool {
        let channel = self.channel_for(session_id);
        match self.bus.publish(&channel, payload).await {
            Ok(receivers) => {
                counter!("bus_publish_total").increment(1);
                debug!(%channel, receivers, "event published");
                true
            }
            Err(error) => {
                warn!(%channel, %error, "failed to publish event");
                counter!("bus_publish_failures_total", "reason" => "transport").increment(1);
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
