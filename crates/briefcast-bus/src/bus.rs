//! The broadcast bus abstraction.
//!
//! A bus carries opaque string payloads on named channels. Publishing never
//! waits for subscribers; a subscription sees only messages published after
//! it was established.

use async_trait::async_trait;
use briefcast_core::SessionId;
use thiserror::Error;

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus is closed or its connection is gone.
    #[error("broadcast bus unavailable: {0}")]
    Unavailable(String),

    /// Subscribing to a channel failed.
    #[error("failed to subscribe to {channel}: {reason}")]
    Subscribe {
        /// Channel name.
        channel: String,
        /// Backend-specific cause.
        reason: String,
    },

    /// Publishing to a channel failed.
    #[error("failed to publish to {channel}: {reason}")]
    Publish {
        /// Channel name.
        channel: String,
        /// Backend-specific cause.
        reason: String,
    },

    /// A received message could not be read as UTF-8 text.
    #[error("unreadable bus payload: {0}")]
    Payload(String),

    /// Redis client error.
    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// A shared publish/subscribe transport.
///
/// One instance is built at startup and shared by `Arc` between the
/// publisher and every bus bridge. Implementations must allow concurrent
/// independent channel operations.
#[async_trait]
pub trait BroadcastBus: Send + Sync + 'static {
    /// Short backend label for logs and `/health`.
    fn backend_name(&self) -> &'static str;

    /// Publish `payload` on `channel`. Returns how many subscribers the
    /// backend reported receiving it (zero is not an error).
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError>;

    /// Subscribe to `channel`. The subscription is live when this returns.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, BusError>;

    /// Release backend resources. Live subscriptions end (their `recv`
    /// yields `None`) and later calls fail with [`BusError::Unavailable`].
    async fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// One live subscription to one channel.
#[async_trait]
pub trait BusSubscription: Send {
    /// Channel this subscription listens on.
    fn channel(&self) -> &str;

    /// Wait for the next message.
    ///
    /// `Some(Err(_))` is a bad message; the subscription is still usable.
    /// `None` means the subscription is gone for good. Cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, BusError>>;

    /// Tear the subscription down.
    async fn unsubscribe(self: Box<Self>);
}

impl std::fmt::Debug for dyn BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription")
            .field("channel", &self.channel())
            .finish_non_exhaustive()
    }
}

/// Channel name for a session: `{prefix}:{session_id}`.
pub fn channel_name(prefix: &str, session_id: &SessionId) -> String {
    format!("{prefix}:{session_id}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
