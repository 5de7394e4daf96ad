//! # briefcast-core
//!
//! Foundation types shared by every briefcast crate.
//!
//! - **Event Record**: the immutable, versioned briefing value object
//!   ([`EventRecord`]) with its closed enumerations and validation
//! - **Branded IDs**: `EventId`, `CorrelationId`, `SessionId`, `ConnectionId`
//! - **Errors**: `ValidationError`, `TransportError`, `ProtocolError` via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;

pub use errors::{ProtocolError, TransportError, ValidationError};
pub use event::{
    Citation, Content, EventRecord, EventRecordBuilder, EventType, GeoReference, ProofLayer,
    Severity, SourceAgent, SuggestedAction, UiBinding, UiTarget,
};
pub use ids::{ConnectionId, CorrelationId, EventId, SessionId};
