//! Per-session bus bridge.
//!
//! A bridge subscribes to one session's bus channel and hands each decoded
//! event record to an [`EventSink`] (the session registry). It moves through
//! `Starting → Listening → Stopping → Terminated` and never restarts itself:
//! after a lost subscription the registry spawns a fresh bridge on the next
//! connect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use async_trait::async_trait;
use briefcast_bus::{BroadcastBus, BusSubscription};
use briefcast_core::{EventRecord, SessionId};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Receives decoded events from a bridge.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Fan `event` out to `session_id`'s connections. Returns how many
    /// connections it was queued for.
    async fn deliver(&self, session_id: &SessionId, event: EventRecord) -> usize;
}

/// Lifecycle state of a bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// Subscribing to the channel.
    Starting = 0,
    /// Receiving and forwarding messages.
    Listening = 1,
    /// Cancelled; unsubscribing.
    Stopping = 2,
    /// Done. The task has exited or never started.
    Terminated = 3,
}

impl BridgeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Listening,
            2 => Self::Stopping,
            _ => Self::Terminated,
        }
    }
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: BridgeState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn set(&self, state: BridgeState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> BridgeState {
        BridgeState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Decrements the live-bridge count when the bridge task ends.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        let _ = count.fetch_add(1, Ordering::AcqRel);
        gauge!("bridges_active").increment(1.0);
        Self(Arc::clone(count))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
        gauge!("bridges_active").decrement(1.0);
    }
}

/// Spawns bridges against one bus and one sink, and counts the live ones.
#[derive(Clone)]
pub struct BusBridge {
    bus: Arc<dyn BroadcastBus>,
    sink: Arc<dyn EventSink>,
    live: Arc<AtomicUsize>,
}

impl BusBridge {
    /// Create a bridge spawner.
    pub fn new(bus: Arc<dyn BroadcastBus>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            bus,
            sink,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of bridge tasks currently running.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// The bus bridges subscribe to.
    pub fn bus(&self) -> &Arc<dyn BroadcastBus> {
        &self.bus
    }

    /// Subscribe to `channel` and spawn the receive loop.
    ///
    /// The subscription is live when this returns. If subscribing fails the
    /// handle is already [`BridgeState::Terminated`].
    pub async fn start(&self, session_id: SessionId, channel: String) -> BridgeHandle {
        let state = StateCell::new(BridgeState::Starting);
        let cancel = CancellationToken::new();

        let subscription = match self.bus.subscribe(&channel).await {
            Ok(sub) => sub,
            Err(error) => {
                error!(%session_id, %channel, %error, "bridge failed to subscribe");
                state.set(BridgeState::Terminated);
                return BridgeHandle {
                    state,
                    cancel,
                    task: None,
                };
            }
        };

        let guard = LiveGuard::enter(&self.live);
        state.set(BridgeState::Listening);
        info!(%session_id, %channel, "bridge listening");

        let span = info_span!("bus_bridge", session_id = %session_id, channel = %channel);
        let task = tokio::spawn(
            receive_loop(
                subscription,
                session_id,
                Arc::clone(&self.sink),
                state.clone(),
                cancel.clone(),
                guard,
            )
            .instrument(span),
        );

        BridgeHandle {
            state,
            cancel,
            task: Some(task),
        }
    }
}

async fn receive_loop(
    mut subscription: Box<dyn BusSubscription>,
    session_id: SessionId,
    sink: Arc<dyn EventSink>,
    state: StateCell,
    cancel: CancellationToken,
    _guard: LiveGuard,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = subscription.recv() => message,
        };

        let raw = match message {
            Some(Ok(raw)) => raw,
            Some(Err(error)) => {
                warn!(%error, "dropping unreadable bus message");
                counter!("bridge_decode_failures_total").increment(1);
                continue;
            }
            None => {
                error!("bus subscription lost, bridge terminating without reconnect");
                subscription.unsubscribe().await;
                state.set(BridgeState::Terminated);
                return;
            }
        };

        let event = match EventRecord::from_json(&raw) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, len = raw.len(), "dropping undecodable bus message");
                counter!("bridge_decode_failures_total").increment(1);
                continue;
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            delivered = sink.deliver(&session_id, event) => {
                debug!(delivered, "event fanned out");
            }
        }
    }

    state.set(BridgeState::Stopping);
    subscription.unsubscribe().await;
    state.set(BridgeState::Terminated);
    debug!("bridge terminated");
}

/// Owner's handle to a running bridge.
///
/// Dropping the handle cancels the bridge without waiting for it.
pub struct BridgeHandle {
    state: StateCell,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.state.get()
    }

    /// Whether the bridge has finished (or never started).
    pub fn is_terminated(&self) -> bool {
        self.state() == BridgeState::Terminated
    }

    /// Signal the bridge to stop without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the bridge task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("bridge task panicked");
                }
            }
        }
        self.state.set(BridgeState::Terminated);
    }

    /// Cancel and wait for the bridge to exit.
    pub async fn stop(self) {
        self.cancel();
        self.join().await;
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
