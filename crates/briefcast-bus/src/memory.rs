//! In-process bus backed by one `tokio::sync::broadcast` channel per name.
//!
//! Suitable for a single server instance and for tests. Channels are created
//! on first subscribe and removed when their last subscriber goes away, so
//! publishing to a channel nobody listens on costs a map lookup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::bus::{BroadcastBus, BusError, BusSubscription};

/// Default per-channel buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

struct Inner {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Inner {
    fn prune(&self, channel: &str) {
        if self
            .channels
            .remove_if(channel, |_, tx| tx.receiver_count() == 0)
            .is_some()
        {
            debug!(channel, "removed idle channel");
        }
    }
}

/// In-memory [`BroadcastBus`].
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    /// Create a bus with the default per-channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose channels buffer up to `capacity` messages for a
    /// slow subscriber before it starts skipping.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for InMemoryBus {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Unavailable("in-memory bus is closed".into()));
        }
        let Some(tx) = self.inner.channels.get(channel).map(|tx| tx.clone()) else {
            return Ok(0);
        };
        // send fails only when every receiver is gone; that is zero deliveries
        Ok(tx.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, BusError> {
        if self.is_closed() {
            return Err(BusError::Unavailable("in-memory bus is closed".into()));
        }
        let rx = self
            .inner
            .channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();
        debug!(channel, "subscribed");
        Ok(Box::new(MemorySubscription {
            channel: channel.to_owned(),
            rx: Some(rx),
            bus: Arc::clone(&self.inner),
        }))
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            // dropping the senders ends every live subscription
            self.inner.channels.clear();
            debug!("in-memory bus closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

struct MemorySubscription {
    channel: String,
    rx: Option<broadcast::Receiver<String>>,
    bus: Arc<Inner>,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn recv(&mut self) -> Option<Result<String, BusError>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(payload) => return Some(Ok(payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, messages skipped");
                    counter!("bus_subscriber_lagged_total").increment(skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn unsubscribe(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.bus.prune(&self.channel);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.publish("p:s1", "x".into()).await.unwrap(), 0);
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("p:s1").await.unwrap();
        let mut b = bus.subscribe("p:s1").await.unwrap();

        assert_eq!(bus.publish("p:s1", "one".into()).await.unwrap(), 2);
        assert_eq!(bus.publish("p:s1", "two".into()).await.unwrap(), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().unwrap(), "one");
            assert_eq!(sub.recv().await.unwrap().unwrap(), "two");
        }
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = InMemoryBus::new();
        let mut s1 = bus.subscribe("p:s1").await.unwrap();
        let _s2 = bus.subscribe("p:s2").await.unwrap();

        let _ = bus.publish("p:s2", "for-s2".into()).await.unwrap();
        let _ = bus.publish("p:s1", "for-s1".into()).await.unwrap();

        assert_eq!(s1.recv().await.unwrap().unwrap(), "for-s1");
    }

    #[tokio::test]
    async fn last_unsubscribe_removes_channel() {
        let bus = InMemoryBus::new();
        let a = bus.subscribe("p:s1").await.unwrap();
        let b = bus.subscribe("p:s1").await.unwrap();
        assert_eq!(bus.subscriber_count("p:s1"), 2);

        a.unsubscribe().await;
        assert_eq!(bus.channel_count(), 1);
        assert_eq!(bus.subscriber_count("p:s1"), 1);

        b.unsubscribe().await;
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.publish("p:s1", "late".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropping_subscription_also_prunes() {
        let bus = InMemoryBus::new();
        {
            let _sub = bus.subscribe("p:s1").await.unwrap();
            assert_eq!(bus.channel_count(), 1);
        }
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_and_continues() {
        let bus = InMemoryBus::with_capacity(2);
        let mut sub = bus.subscribe("p:s1").await.unwrap();
        for i in 0..5 {
            let _ = bus.publish("p:s1", format!("m{i}")).await.unwrap();
        }
        // oldest messages were overwritten; the newest two survive
        assert_eq!(sub.recv().await.unwrap().unwrap(), "m3");
        assert_eq!(sub.recv().await.unwrap().unwrap(), "m4");
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_calls() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("p:s1").await.unwrap();

        bus.close().await;
        assert!(bus.is_closed());
        assert!(sub.recv().await.is_none());
        assert_matches!(
            bus.publish("p:s1", "x".into()).await,
            Err(BusError::Unavailable(_))
        );
        assert_matches!(bus.subscribe("p:s1").await, Err(BusError::Unavailable(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let bus = InMemoryBus::new();
        bus.close().await;
        bus.close().await;
        assert!(bus.is_closed());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = InMemoryBus::with_capacity(0);
        assert_eq!(bus.inner.capacity, 1);
    }
}
