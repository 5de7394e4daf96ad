//! # briefcast-bus
//!
//! The shared broadcast bus and the producer-side publisher.
//!
//! - [`BroadcastBus`] / [`BusSubscription`]: backend-neutral pub/sub traits
//! - [`InMemoryBus`]: single-process backend on `tokio::sync::broadcast`
//! - `RedisBus`: Redis pub/sub backend (cargo feature `redis`)
//! - [`Publisher`]: serializes event records onto `{prefix}:{session_id}`
//!
//! The bus is an explicit resource: built once, shared by `Arc`, closed on
//! shutdown.

#![deny(unsafe_code)]

pub mod bus;
pub mod memory;
pub mod publisher;
#[cfg(feature = "redis")]
pub mod redis_bus;

pub use bus::{BroadcastBus, BusError, BusSubscription, channel_name};
pub use memory::InMemoryBus;
pub use publisher::Publisher;
#[cfg(feature = "redis")]
pub use redis_bus::RedisBus;
