//! One live client connection.
//!
//! The registry never touches the socket. It pushes serialized frames into a
//! bounded queue that the connection's writer task drains. A full or closed
//! queue is a [`TransportError`] and gets the connection evicted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use briefcast_core::{ConnectionId, TransportError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::protocol::ServerFrame;

/// Handle to a connected client, shared between the registry and the
/// transport tasks.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client answered since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames that could not be queued.
    pub dropped_messages: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a connection writing into `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(ConnectionId::new(), tx)), rx)
    }

    /// Queue a serialized frame without waiting.
    pub fn send(&self, message: Arc<String>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.id.to_string()));
        }
        self.tx.try_send(message).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull(self.id.to_string()),
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed(self.id.to_string()),
            }
        })
    }

    /// Serialize and queue a control frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> Result<(), TransportError> {
        let json = frame
            .to_json()
            .map_err(|_| TransportError::Closed(self.id.to_string()))?;
        self.send(Arc::new(json))
    }

    /// Total frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a pong (or any sign of life).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last pong, or since connect if none arrived.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the connection was established.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Mark the connection closed. Its transport tasks observe this and
    /// shut the socket. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection is closed.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
