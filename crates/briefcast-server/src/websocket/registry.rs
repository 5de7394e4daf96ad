//! Session registry: which connections belong to which session, and the one
//! bus bridge each live session owns.
//!
//! Every session ID maps to a slot behind its own async mutex, so work on one
//! session never waits on another. Within a slot the lock serializes
//! connect, disconnect, fan-out, and teardown, which is what keeps the
//! invariant "a session has a bridge iff it has connections" observable at
//! every point.
//!
//! Teardown of a session retires its slot and removes it from the map while
//! still holding the slot lock. A `connect` that raced onto a retired slot
//! retries against a fresh one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use briefcast_bus::{BroadcastBus, channel_name};
use briefcast_core::{ConnectionId, EventRecord, SessionId, TransportError};
use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::bridge::{BridgeHandle, BridgeState, BusBridge, EventSink};
use super::connection::ClientConnection;
use super::filter::{self, AdmissionFilter};
use super::protocol::ServerFrame;

struct Member {
    connection: Arc<ClientConnection>,
    filter: Option<AdmissionFilter>,
}

struct Session {
    members: HashMap<ConnectionId, Member>,
    filter: Option<AdmissionFilter>,
    bridge: BridgeHandle,
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    /// Bridge cancelled by fan-out when the last member was evicted; joined
    /// by the reaper or by the next connect, whichever locks first.
    draining: Option<BridgeHandle>,
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

struct Shared {
    sessions: DashMap<SessionId, SlotRef>,
    bridges: BusBridge,
    channel_prefix: String,
    live_sessions: AtomicUsize,
    live_connections: AtomicUsize,
    /// Set by `shutdown`; later connects are refused.
    closed: AtomicBool,
}

/// Forwards bridge deliveries back into the registry without keeping it
/// alive.
struct RegistrySink(Weak<Shared>);

#[async_trait]
impl EventSink for RegistrySink {
    async fn deliver(&self, session_id: &SessionId, event: EventRecord) -> usize {
        match self.0.upgrade() {
            Some(shared) => SessionRegistry { shared }.broadcast(session_id, &event).await,
            None => 0,
        }
    }
}

/// Registry of live sessions and their connections.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    /// Create a registry whose bridges subscribe to `{channel_prefix}:{session_id}`
    /// on `bus`.
    pub fn new(bus: Arc<dyn BroadcastBus>, channel_prefix: impl Into<String>) -> Self {
        let channel_prefix = channel_prefix.into();
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| Shared {
            sessions: DashMap::new(),
            bridges: BusBridge::new(bus, Arc::new(RegistrySink(weak.clone()))),
            channel_prefix,
            live_sessions: AtomicUsize::new(0),
            live_connections: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        Self { shared }
    }

    /// Add `connection` to `session_id`, creating the session and its bridge
    /// if this is the first connection.
    ///
    /// The `connected` frame is queued to this connection before any event
    /// can reach it. If that fails the connection is not registered.
    ///
    /// After [`shutdown`](Self::shutdown) every connect fails with
    /// [`TransportError::Closed`].
    pub async fn connect(
        &self,
        connection: Arc<ClientConnection>,
        session_id: SessionId,
    ) -> Result<(), TransportError> {
        loop {
            let slot = self.slot(&session_id);
            let mut guard = slot.lock().await;
            if guard.retired {
                continue;
            }

            // checked under the slot lock so shutdown's sweep sees this slot
            if self.is_shut_down() {
                if guard.session.is_none() && guard.draining.is_none() {
                    self.retire(&session_id, &slot, &mut guard);
                }
                debug!(%session_id, conn_id = %connection.id, "registry is shut down, refusing connection");
                connection.close();
                return Err(TransportError::Closed(connection.id.to_string()));
            }

            if let Some(draining) = guard.draining.take() {
                debug!(%session_id, "waiting for previous bridge to finish");
                draining.join().await;
            }

            let mut session = match guard.session.take() {
                Some(mut session) => {
                    if session.bridge.is_terminated() {
                        warn!(%session_id, "bridge had terminated, starting a new one");
                        session.bridge = self.start_bridge(&session_id).await;
                    }
                    session
                }
                None => {
                    let bridge = self.start_bridge(&session_id).await;
                    self.session_opened(&session_id);
                    Session {
                        members: HashMap::new(),
                        filter: None,
                        bridge,
                    }
                }
            };

            let conn_id = connection.id.clone();
            let frame = ServerFrame::connected(session_id.clone());
            if let Err(error) = connection.send_frame(&frame) {
                warn!(%session_id, %conn_id, %error, "failed to send connected frame");
                if session.members.is_empty() {
                    session.bridge.stop().await;
                    self.session_closed(&session_id);
                    self.retire(&session_id, &slot, &mut guard);
                } else {
                    guard.session = Some(session);
                }
                return Err(error);
            }

            let _ = session.members.insert(
                conn_id.clone(),
                Member {
                    connection,
                    filter: None,
                },
            );
            let _ = self.shared.live_connections.fetch_add(1, Ordering::AcqRel);
            debug!(%session_id, %conn_id, members = session.members.len(), "connection joined");
            guard.session = Some(session);
            return Ok(());
        }
    }

    /// Remove a connection. Idempotent: returns `false` if it was not
    /// registered.
    ///
    /// Removing the last connection stops the session's bridge and waits for
    /// it before returning.
    pub async fn disconnect(&self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        let Some(slot) = self.existing_slot(session_id) else {
            return false;
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.session.as_mut() else {
            return false;
        };
        let Some(member) = session.members.remove(connection_id) else {
            return false;
        };
        member.connection.close();
        self.connections_removed(1);
        debug!(%session_id, conn_id = %connection_id, "connection left");

        if session.members.is_empty() {
            if let Some(session) = guard.session.take() {
                session.bridge.stop().await;
            }
            self.session_closed(session_id);
            self.retire(session_id, &slot, &mut guard);
        }
        true
    }

    /// Deliver `event` to every admitted connection of `session_id`.
    ///
    /// The record is serialized once. A connection whose queue rejects the
    /// frame is evicted; the others are unaffected. Returns the number of
    /// connections the frame was queued for.
    pub async fn broadcast(&self, session_id: &SessionId, event: &EventRecord) -> usize {
        let Some(slot) = self.existing_slot(session_id) else {
            return 0;
        };
        let payload = match event.to_json() {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(%session_id, %error, "failed to serialize event for fan-out");
                return 0;
            }
        };

        let mut guard = slot.lock().await;
        let Some(session) = guard.session.as_mut() else {
            return 0;
        };
        if !filter::admits(session.filter.as_ref(), event) {
            return 0;
        }

        let mut delivered = 0usize;
        let mut evicted = Vec::new();
        for (conn_id, member) in &session.members {
            if !filter::admits(member.filter.as_ref(), event) {
                continue;
            }
            match member.connection.send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(%session_id, %conn_id, %error, "evicting connection");
                    evicted.push(conn_id.clone());
                }
            }
        }

        for conn_id in &evicted {
            if let Some(member) = session.members.remove(conn_id) {
                member.connection.close();
                counter!("ws_evictions_total").increment(1);
            }
        }
        self.connections_removed(evicted.len());
        counter!("events_delivered_total").increment(delivered as u64);

        if session.members.is_empty() {
            if let Some(session) = guard.session.take() {
                // Called from the bridge's own task: cancel it here, join elsewhere.
                session.bridge.cancel();
                guard.draining = Some(session.bridge);
                self.session_closed(session_id);
                self.spawn_reaper(session_id.clone(), Arc::clone(&slot));
            }
        }
        delivered
    }

    /// Set the session-wide filter. Returns `false` if the session is not live.
    pub async fn set_filter(&self, session_id: &SessionId, filter: AdmissionFilter) -> bool {
        self.with_session(session_id, |session| session.filter = Some(filter))
            .await
            .is_some()
    }

    /// Drop the session-wide filter.
    pub async fn clear_filter(&self, session_id: &SessionId) -> bool {
        self.with_session(session_id, |session| session.filter = None)
            .await
            .is_some()
    }

    /// Set one connection's filter. Returns `false` if it is not registered.
    pub async fn set_connection_filter(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
        filter: AdmissionFilter,
    ) -> bool {
        self.with_session(session_id, |session| {
            session
                .members
                .get_mut(connection_id)
                .map(|member| member.filter = Some(filter))
                .is_some()
        })
        .await
        .unwrap_or(false)
    }

    /// Drop one connection's filter.
    pub async fn clear_connection_filter(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> bool {
        self.with_session(session_id, |session| {
            session
                .members
                .get_mut(connection_id)
                .map(|member| member.filter = None)
                .is_some()
        })
        .await
        .unwrap_or(false)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.shared.live_sessions.load(Ordering::Acquire)
    }

    /// Number of registered connections across all sessions.
    pub fn total_connections(&self) -> usize {
        self.shared.live_connections.load(Ordering::Acquire)
    }

    /// Number of bridge tasks still running, including ones being drained.
    pub fn active_bridges(&self) -> usize {
        self.shared.bridges.live_count()
    }

    /// Name of the bus backend bridges subscribe to.
    pub fn bus_backend(&self) -> &'static str {
        self.shared.bridges.bus().backend_name()
    }

    /// Connections registered to `session_id`.
    pub async fn connection_count(&self, session_id: &SessionId) -> usize {
        self.with_session(session_id, |session| session.members.len())
            .await
            .unwrap_or(0)
    }

    /// Whether `session_id` owns a running bridge.
    pub async fn has_bridge(&self, session_id: &SessionId) -> bool {
        self.with_session(session_id, |session| !session.bridge.is_terminated())
            .await
            .unwrap_or(false)
    }

    /// State of `session_id`'s bridge, if the session is live.
    pub async fn bridge_state(&self, session_id: &SessionId) -> Option<BridgeState> {
        self.with_session(session_id, |session| session.bridge.state())
            .await
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close every connection and stop every bridge. Connections that
    /// arrive afterwards are refused.
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let slots: Vec<(SessionId, SlotRef)> = self
            .shared
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (session_id, slot) in slots {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.session.take() {
                for member in session.members.values() {
                    member.connection.close();
                }
                self.connections_removed(session.members.len());
                session.bridge.stop().await;
                self.session_closed(&session_id);
            }
            if let Some(draining) = guard.draining.take() {
                draining.join().await;
            }
            if !guard.retired {
                self.retire(&session_id, &slot, &mut guard);
            }
        }
        info!(bridges = self.active_bridges(), "session registry shut down");
    }

    // ── internals ──────────────────────────────────────────────────────

    fn slot(&self, session_id: &SessionId) -> SlotRef {
        Arc::clone(
            self.shared
                .sessions
                .entry(session_id.clone())
                .or_default()
                .value(),
        )
    }

    fn existing_slot(&self, session_id: &SessionId) -> Option<SlotRef> {
        self.shared
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn with_session<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        let slot = self.existing_slot(session_id)?;
        let mut guard = slot.lock().await;
        guard.session.as_mut().map(f)
    }

    async fn start_bridge(&self, session_id: &SessionId) -> BridgeHandle {
        let channel = channel_name(&self.shared.channel_prefix, session_id);
        self.shared.bridges.start(session_id.clone(), channel).await
    }

    /// Mark a slot dead and unmap it. Caller holds the slot lock.
    fn retire(&self, session_id: &SessionId, slot: &SlotRef, guard: &mut Slot) {
        guard.retired = true;
        let _ = self
            .shared
            .sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, slot));
    }

    fn spawn_reaper(&self, session_id: SessionId, slot: SlotRef) {
        let registry = self.clone();
        let _ = tokio::spawn(async move {
            let mut guard = slot.lock().await;
            let Some(draining) = guard.draining.take() else {
                return;
            };
            draining.join().await;
            if guard.session.is_none() && !guard.retired {
                registry.retire(&session_id, &slot, &mut guard);
                debug!(%session_id, "drained session reaped");
            }
        });
    }

    fn session_opened(&self, session_id: &SessionId) {
        let _ = self.shared.live_sessions.fetch_add(1, Ordering::AcqRel);
        gauge!("sessions_active").increment(1.0);
        info!(%session_id, "session opened");
    }

    fn session_closed(&self, session_id: &SessionId) {
        let _ = self.shared.live_sessions.fetch_sub(1, Ordering::AcqRel);
        gauge!("sessions_active").decrement(1.0);
        info!(%session_id, "session closed");
    }

    fn connections_removed(&self, n: usize) {
        if n > 0 {
            let _ = self.shared.live_connections.fetch_sub(n, Ordering::AcqRel);
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_count())
            .field("connections", &self.total_connections())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
