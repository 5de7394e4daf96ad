//! Redis pub/sub backend for multi-process deployments.
//!
//! `PUBLISH` goes over one shared multiplexed connection. Each subscription
//! opens its own pub/sub connection, so sessions never share subscribe state.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{BroadcastBus, BusError, BusSubscription};

type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

/// Redis-backed [`BroadcastBus`].
pub struct RedisBus {
    client: redis::Client,
    publisher: redis::aio::MultiplexedConnection,
    closed: CancellationToken,
}

impl RedisBus {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        info!(url, "connected to redis bus");
        Ok(Self {
            client,
            publisher,
            closed: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Unavailable("redis bus is closed".into()));
        }
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, usize>(channel, payload)
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, BusError> {
        if self.is_closed() {
            return Err(BusError::Unavailable("redis bus is closed".into()));
        }
        let to_subscribe_error = |e: redis::RedisError| BusError::Subscribe {
            channel: channel.to_owned(),
            reason: e.to_string(),
        };
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(to_subscribe_error)?;
        pubsub.subscribe(channel).await.map_err(to_subscribe_error)?;
        debug!(channel, "redis subscription established");

        Ok(Box::new(RedisSubscription {
            channel: channel.to_owned(),
            messages: Box::pin(pubsub.into_on_message()),
            closed: self.closed.clone(),
        }))
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

struct RedisSubscription {
    channel: String,
    messages: MessageStream,
    closed: CancellationToken,
}

#[async_trait]
impl BusSubscription for RedisSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn recv(&mut self) -> Option<Result<String, BusError>> {
        tokio::select! {
            () = self.closed.cancelled() => None,
            msg = self.messages.next() => msg.map(|m| {
                m.get_payload::<String>()
                    .map_err(|e| BusError::Payload(e.to_string()))
            }),
        }
    }

    async fn unsubscribe(self: Box<Self>) {
        // dropping the stream closes the dedicated pub/sub connection
        debug!(channel = %self.channel, "redis subscription dropped");
    }
}
