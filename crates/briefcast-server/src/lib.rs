//! # briefcast-server
//!
//! Axum HTTP + `WebSocket` server that fans session events out to clients.
//!
//! - `WebSocket` transport at `/ws/{session_id}`: connection queues, `ping`
//!   heartbeat, `subscribe` / `unsubscribe` control frames
//! - Session registry with one bus bridge per live session
//! - HTTP endpoints: health, Prometheus metrics, event publish
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, BriefcastServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::bridge::{BridgeHandle, BridgeState, BusBridge, EventSink};
pub use websocket::connection::ClientConnection;
pub use websocket::filter::AdmissionFilter;
pub use websocket::protocol::{ClientFrame, ServerFrame};
pub use websocket::registry::SessionRegistry;
pub use websocket::session::SessionOptions;
