//! WebSocket transport: connections, control frames, heartbeat, admission
//! filters, the per-session bus bridge, and the session registry.

pub mod bridge;
pub mod connection;
pub mod filter;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod session;
